//! Service control boundary

pub mod systemd;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

pub use systemd::SystemdController;

/// Observed state of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Running,
    Stopped,
    StartPending,
    StopPending,
    Failed,
    Unknown(String),
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::StartPending => write!(f, "starting"),
            ServiceStatus::StopPending => write!(f, "stopping"),
            ServiceStatus::Failed => write!(f, "failed"),
            ServiceStatus::Unknown(raw) => write!(f, "unknown ({})", raw),
        }
    }
}

/// Stop, start and query a named service, locally or on `host`.
///
/// Implementations must be idempotent: stopping a stopped service or
/// starting a running one returns `Ok(true)` straight away. Both operations
/// return `Ok(false)` once `timeout` elapses rather than waiting forever.
#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn stop(
        &self,
        name: &str,
        host: Option<&str>,
        timeout: Duration,
    ) -> Result<bool, DeployError>;

    async fn start(
        &self,
        name: &str,
        host: Option<&str>,
        timeout: Duration,
    ) -> Result<bool, DeployError>;

    /// `None` when the status could not be determined
    async fn status(
        &self,
        name: &str,
        host: Option<&str>,
    ) -> Result<Option<ServiceStatus>, DeployError>;
}
