//! Backup creation, restore and retention

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backup::naming::{backup_name, backup_root_for, is_backup_name, parse_backup_time};
use crate::backup::{BackupStore, CleanupReport};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::transfer::FileOps;

/// Backup manager built on a [`FileOps`] implementation
pub struct BackupManager {
    files: Arc<dyn FileOps>,
    concurrency: usize,
}

impl BackupManager {
    pub fn new(files: Arc<dyn FileOps>, concurrency: usize) -> Self {
        Self {
            files,
            concurrency: concurrency.max(1),
        }
    }

    /// First free backup directory for this second
    async fn allocate(&self, root: &Path, version_tag: Option<&str>) -> PathBuf {
        let name = backup_name(Local::now(), version_tag);
        let mut candidate = root.join(&name);
        let mut counter = 2;
        while fs::metadata(&candidate).await.is_ok() {
            candidate = root.join(format!("{}-{}", name, counter));
            counter += 1;
        }
        candidate
    }
}

#[async_trait]
impl BackupStore for BackupManager {
    async fn create_backup(
        &self,
        source: &Path,
        version_tag: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, DeployError> {
        if !Dir::new(source).exists().await {
            info!("No existing deployment at {}, skipping backup", source.display());
            return Ok(None);
        }

        let root = backup_root_for(source);
        let target = self.allocate(&root, version_tag).await;
        info!("Backing up {} to {}", source.display(), target.display());

        let outcome = match self
            .files
            .copy_directory(source, &target, self.concurrency, None, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(DeployError::Cancelled) => {
                discard_partial(&target).await;
                return Err(DeployError::Cancelled);
            }
            Err(e) => {
                error!("Backup of {} failed: {}", source.display(), e);
                discard_partial(&target).await;
                return Ok(None);
            }
        };

        if !outcome.success {
            match &outcome.failure {
                Some(f) => error!("Backup of {} failed: {}", source.display(), f),
                None => error!("Backup of {} incomplete", source.display()),
            }
            discard_partial(&target).await;
            return Ok(None);
        }

        info!("Backup created with {} files", outcome.files_copied);
        Ok(Some(target))
    }

    async fn restore_backup(
        &self,
        backup: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, DeployError> {
        info!("Restoring {} from {}", destination.display(), backup.display());

        if !Dir::new(backup).exists().await {
            error!("Backup {} does not exist", backup.display());
            return Ok(false);
        }

        if !self.files.delete_directory(destination, cancel).await? {
            error!("Unable to clear {} before restore", destination.display());
            return Ok(false);
        }

        let outcome = match self
            .files
            .copy_directory(backup, destination, self.concurrency, None, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(DeployError::Cancelled) => return Err(DeployError::Cancelled),
            Err(e) => {
                error!("Restore into {} failed: {}", destination.display(), e);
                return Ok(false);
            }
        };

        if let Some(f) = &outcome.failure {
            error!("Restore into {} failed: {}", destination.display(), f);
        }
        Ok(outcome.success)
    }

    async fn clean_old_backups(&self, backup_root: &Path, retention_days: u32) -> CleanupReport {
        let mut report = CleanupReport::default();
        let root = Dir::new(backup_root);
        if !root.exists().await {
            debug!("No backups at {}", backup_root.display());
            return report;
        }

        let folders = match root.list_dirs().await {
            Ok(folders) => folders,
            Err(e) => {
                warn!("Unable to list backups in {}: {}", backup_root.display(), e);
                return report;
            }
        };

        let cutoff = Local::now().naive_local() - chrono::Duration::days(i64::from(retention_days));
        info!(
            "Removing backups older than {} days from {}",
            retention_days,
            backup_root.display()
        );

        for folder in folders {
            let Some(name) = folder.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_backup_name(name) {
                continue;
            }

            let Some(created) = backup_time(&folder, name).await else {
                warn!("Unable to determine age of {}, keeping it", folder.display());
                continue;
            };
            if created >= cutoff {
                continue;
            }

            match fs::remove_dir_all(&folder).await {
                Ok(()) => {
                    info!("Removed old backup {}", folder.display());
                    report.removed.push(folder);
                }
                Err(e) => {
                    warn!("Failed to remove old backup {}: {}", folder.display(), e);
                    report.failed.push(folder);
                }
            }
        }

        report
    }
}

async fn discard_partial(target: &Path) {
    if let Err(e) = Dir::new(target).delete().await {
        warn!("Unable to remove partial backup {}: {}", target.display(), e);
    }
}

/// Creation time of a backup folder: the timestamp in its name, else the
/// filesystem birth time, else its modification time.
async fn backup_time(folder: &Path, name: &str) -> Option<NaiveDateTime> {
    if let Some(at) = parse_backup_time(name) {
        return Some(at);
    }
    let meta = fs::metadata(folder).await.ok()?;
    let time: SystemTime = meta.created().or_else(|_| meta.modified()).ok()?;
    Some(DateTime::<Local>::from(time).naive_local())
}
