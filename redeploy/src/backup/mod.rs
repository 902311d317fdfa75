//! Timestamped backups of a deployment destination

pub mod manager;
pub mod naming;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::DeployError;

pub use manager::BackupManager;

/// Outcome of a retention sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Backups that were deleted
    pub removed: Vec<PathBuf>,
    /// Backups that were due for deletion but could not be removed
    pub failed: Vec<PathBuf>,
}

/// Backup lifecycle the orchestrator depends on
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Snapshot `source`. Returns `None` when there is nothing to back up
    /// or the snapshot could not be taken.
    async fn create_backup(
        &self,
        source: &Path,
        version_tag: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, DeployError>;

    /// Replace `destination` with the contents of `backup`
    async fn restore_backup(
        &self,
        backup: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, DeployError>;

    /// Delete backups under `backup_root` older than `retention_days`
    async fn clean_old_backups(&self, backup_root: &Path, retention_days: u32) -> CleanupReport;
}
