//! Bounded-parallel file transfer and content verification

pub mod engine;
pub mod pool;
pub mod verify;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::DeployError;

pub use engine::TransferEngine;
pub use pool::FirstFailure;
pub use verify::ContentVerifier;

/// Progress callback receiving `(files_done, files_total)`
pub type TransferProgress<'a> = dyn Fn(usize, usize) + Send + Sync + 'a;

/// Why a single file failed to copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFailure {
    /// Path relative to the source root
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for CopyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to copy {}: {}", self.path.display(), self.reason)
    }
}

/// Result of copying a directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub success: bool,
    pub files_copied: usize,
    pub files_total: usize,
    /// First failure recorded by any worker
    pub failure: Option<CopyFailure>,
}

/// Why verification of a tree failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// The destination has no file at this relative path
    Missing(PathBuf),
    /// Both files exist but their digests differ
    Mismatch(PathBuf),
    /// One of the two files could not be read
    Unreadable { path: PathBuf, reason: String },
}

impl VerifyFailure {
    pub fn path(&self) -> &Path {
        match self {
            VerifyFailure::Missing(path) | VerifyFailure::Mismatch(path) => path,
            VerifyFailure::Unreadable { path, .. } => path,
        }
    }
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyFailure::Missing(path) => {
                write!(f, "missing file in destination: {}", path.display())
            }
            VerifyFailure::Mismatch(path) => write!(f, "content mismatch: {}", path.display()),
            VerifyFailure::Unreadable { path, reason } => {
                write!(f, "unable to read {}: {}", path.display(), reason)
            }
        }
    }
}

/// Result of comparing two directory trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub files_checked: usize,
    pub failure: Option<VerifyFailure>,
}

impl VerifyOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// File operations the orchestrator and backup manager depend on.
///
/// `Err` is reserved for cancellation and environment failures such as an
/// unreadable source root; per-file problems are reported in the outcome.
#[async_trait]
pub trait FileOps: Send + Sync {
    /// Copy every file under `source` into `destination`
    async fn copy_directory(
        &self,
        source: &Path,
        destination: &Path,
        concurrency: usize,
        progress: Option<&TransferProgress<'_>>,
        cancel: &CancellationToken,
    ) -> Result<CopyOutcome, DeployError>;

    /// Compare every file under `source` against its counterpart in `destination`
    async fn verify_directory(
        &self,
        source: &Path,
        destination: &Path,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<VerifyOutcome, DeployError>;

    /// Remove a directory tree. A missing path counts as success.
    async fn delete_directory(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, DeployError>;
}
