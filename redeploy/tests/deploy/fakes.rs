//! Test doubles for the service and file boundaries

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redeploy::errors::DeployError;
use redeploy::filesys::dir::Dir;
use redeploy::filesys::file::File;
use redeploy::service::{ServiceController, ServiceStatus};
use redeploy::transfer::{
    CopyOutcome, FileOps, TransferEngine, TransferProgress, VerifyFailure, VerifyOutcome,
};
use tokio_util::sync::CancellationToken;

/// In-memory service that records every call
pub struct FakeService {
    stop_ok: bool,
    stop_delay: Duration,
    start_results: Mutex<VecDeque<bool>>,
    running: AtomicBool,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeService {
    pub fn healthy() -> Self {
        Self {
            stop_ok: true,
            stop_delay: Duration::ZERO,
            start_results: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Never manages to stop
    pub fn stuck() -> Self {
        Self {
            stop_ok: false,
            ..Self::healthy()
        }
    }

    /// Takes `delay` to stop
    pub fn slow(delay: Duration) -> Self {
        Self {
            stop_delay: delay,
            ..Self::healthy()
        }
    }

    /// Start attempts answer from `results` in order, then succeed
    pub fn with_start_results(results: Vec<bool>) -> Self {
        Self {
            start_results: Mutex::new(results.into()),
            ..Self::healthy()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceController for FakeService {
    async fn stop(
        &self,
        _name: &str,
        _host: Option<&str>,
        _timeout: Duration,
    ) -> Result<bool, DeployError> {
        self.calls.lock().unwrap().push("stop");
        tokio::time::sleep(self.stop_delay).await;
        if self.stop_ok {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(self.stop_ok)
    }

    async fn start(
        &self,
        _name: &str,
        _host: Option<&str>,
        _timeout: Duration,
    ) -> Result<bool, DeployError> {
        self.calls.lock().unwrap().push("start");
        let ok = self.start_results.lock().unwrap().pop_front().unwrap_or(true);
        if ok {
            self.running.store(true, Ordering::SeqCst);
        }
        Ok(ok)
    }

    async fn status(
        &self,
        _name: &str,
        _host: Option<&str>,
    ) -> Result<Option<ServiceStatus>, DeployError> {
        self.calls.lock().unwrap().push("status");
        Ok(Some(if self.is_running() {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        }))
    }
}

/// Copies the first file of the tree, then errors out
#[derive(Default)]
pub struct BrokenCopy {
    engine: TransferEngine,
}

#[async_trait]
impl FileOps for BrokenCopy {
    async fn copy_directory(
        &self,
        source: &Path,
        destination: &Path,
        _concurrency: usize,
        progress: Option<&TransferProgress<'_>>,
        _cancel: &CancellationToken,
    ) -> Result<CopyOutcome, DeployError> {
        let files = Dir::new(source).walk_files().await?;
        if let Some(first) = files.first() {
            File::new(source.join(first))
                .copy_to(&destination.join(first))
                .await?;
            if let Some(progress) = progress {
                progress(1, files.len());
            }
        }
        Err(DeployError::TransferError("disk full".to_string()))
    }

    async fn verify_directory(
        &self,
        source: &Path,
        destination: &Path,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<VerifyOutcome, DeployError> {
        self.engine
            .verify_directory(source, destination, concurrency, cancel)
            .await
    }

    async fn delete_directory(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, DeployError> {
        self.engine.delete_directory(path, cancel).await
    }
}

/// Copies faithfully but always reports a digest mismatch
#[derive(Default)]
pub struct CorruptingVerify {
    engine: TransferEngine,
}

#[async_trait]
impl FileOps for CorruptingVerify {
    async fn copy_directory(
        &self,
        source: &Path,
        destination: &Path,
        concurrency: usize,
        progress: Option<&TransferProgress<'_>>,
        cancel: &CancellationToken,
    ) -> Result<CopyOutcome, DeployError> {
        self.engine
            .copy_directory(source, destination, concurrency, progress, cancel)
            .await
    }

    async fn verify_directory(
        &self,
        _source: &Path,
        _destination: &Path,
        _concurrency: usize,
        _cancel: &CancellationToken,
    ) -> Result<VerifyOutcome, DeployError> {
        Ok(VerifyOutcome {
            files_checked: 1,
            failure: Some(VerifyFailure::Mismatch("a.txt".into())),
        })
    }

    async fn delete_directory(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, DeployError> {
        self.engine.delete_directory(path, cancel).await
    }
}
