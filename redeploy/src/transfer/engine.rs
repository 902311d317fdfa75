//! Parallel directory copy

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::transfer::pool::{run_bounded, FirstFailure};
use crate::transfer::verify::ContentVerifier;
use crate::transfer::{CopyFailure, CopyOutcome, FileOps, TransferProgress, VerifyOutcome};

/// Copies directory trees with a bounded number of files in flight.
///
/// Files already copied are left in place when a copy fails or is
/// cancelled; callers that need the previous state restore it from a backup.
#[derive(Debug, Clone, Default)]
pub struct TransferEngine {
    verifier: ContentVerifier,
}

impl TransferEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every file under `source` into `destination`, overwriting
    /// existing files. The full file list is collected before the first copy
    /// so `progress` always sees a stable total.
    pub async fn copy_tree(
        &self,
        source: &Path,
        destination: &Path,
        concurrency: usize,
        progress: Option<&TransferProgress<'_>>,
        cancel: &CancellationToken,
    ) -> Result<CopyOutcome, DeployError> {
        let files = Dir::new(source).walk_files().await?;
        let total = files.len();
        info!(
            "Copying {} files from {} to {} (concurrency {})",
            total,
            source.display(),
            destination.display(),
            concurrency
        );

        Dir::new(destination).create().await?;

        let failure = Arc::new(FirstFailure::<CopyFailure>::new());
        let source_root = source.to_path_buf();
        let destination_root = destination.to_path_buf();

        let files_copied = run_bounded(
            files,
            concurrency,
            cancel,
            failure.clone(),
            |done| {
                if let Some(report) = progress {
                    report(done, total);
                }
            },
            move |relative: PathBuf| {
                let from = File::new(source_root.join(&relative));
                let to = destination_root.join(&relative);
                async move {
                    match from.copy_to(&to).await {
                        Ok(bytes) => {
                            debug!("Copied {} ({} bytes)", relative.display(), bytes);
                            Ok(())
                        }
                        Err(e) => Err(CopyFailure {
                            path: relative,
                            reason: e.to_string(),
                        }),
                    }
                }
            },
        )
        .await
        .inspect_err(|e| {
            if e.is_cancelled() {
                warn!("Copy to {} cancelled", destination.display());
            }
        })?;

        let failure = failure.cloned();
        if let Some(ref f) = failure {
            error!("Copy failed after {}/{} files: {}", files_copied, total, f);
        } else {
            info!("Copied {}/{} files", files_copied, total);
        }

        Ok(CopyOutcome {
            success: failure.is_none() && files_copied == total,
            files_copied,
            files_total: total,
            failure,
        })
    }

    /// Recursively remove `path`. A path that does not exist is a success;
    /// a file or symlink at `path` is removed as is.
    pub async fn delete_tree(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, DeployError> {
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let meta = match fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Nothing to delete at {}", path.display());
                return Ok(true);
            }
            Err(e) => {
                error!("Unable to inspect {}: {}", path.display(), e);
                return Ok(false);
            }
        };

        let removed = if meta.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };
        match removed {
            Ok(()) => {
                info!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) => {
                error!("Failed to delete {}: {}", path.display(), e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl FileOps for TransferEngine {
    async fn copy_directory(
        &self,
        source: &Path,
        destination: &Path,
        concurrency: usize,
        progress: Option<&TransferProgress<'_>>,
        cancel: &CancellationToken,
    ) -> Result<CopyOutcome, DeployError> {
        self.copy_tree(source, destination, concurrency, progress, cancel)
            .await
    }

    async fn verify_directory(
        &self,
        source: &Path,
        destination: &Path,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<VerifyOutcome, DeployError> {
        self.verifier
            .verify(source, destination, concurrency, cancel)
            .await
    }

    async fn delete_directory(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, DeployError> {
        self.delete_tree(path, cancel).await
    }
}
