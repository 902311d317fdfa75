//! Redeploy Library
//!
//! Stops a service, backs up its directory, copies and verifies a new build,
//! starts the service again and rolls back when any step fails.

pub mod backup;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod service;
pub mod storage;
pub mod transfer;
pub mod utils;
