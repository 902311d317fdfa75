//! Deployment orchestration

pub mod audit;
pub mod options;
pub mod orchestrator;
pub mod result;
pub mod retry;
pub mod stage;
pub mod target;

pub use options::DeploymentOptions;
pub use orchestrator::{Deployer, DeployerConfig};
pub use result::{DeploymentProgress, DeploymentResult, ProgressSink, RollbackOutcome};
pub use stage::Stage;
