//! Per-run deployment options

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::DeployError;
use crate::storage::settings::Settings;

/// Options for one deployment run
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentOptions {
    /// Name of the service to stop and restart
    pub service_name: String,

    /// Directory holding the new build
    pub source_path: PathBuf,

    /// Directory the service runs from
    pub destination_path: PathBuf,

    /// Host running the service. Derived from a network-style destination
    /// when unset.
    pub remote_host: Option<String>,

    pub enable_backup: bool,

    /// Free-form label embedded in the backup folder name
    pub version_tag: Option<String>,

    pub backup_retention_days: u32,

    pub verify_after_copy: bool,

    /// Attempts for each service stop/start, at least 1
    pub max_retries: u32,

    pub retry_delay: Duration,

    /// Timeout for one service stop or start
    pub service_timeout: Duration,

    /// Maximum files copied or hashed at once, at least 1
    pub max_concurrency: usize,

    pub enable_rollback: bool,

    /// Log intended actions without touching the service or filesystem
    pub dry_run: bool,
}

impl DeploymentOptions {
    pub fn new(
        service_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            remote_host: None,
            enable_backup: true,
            version_tag: None,
            backup_retention_days: 30,
            verify_after_copy: true,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            service_timeout: Duration::from_secs(30),
            max_concurrency: 4,
            enable_rollback: true,
            dry_run: false,
        }
    }

    /// Build options from process-wide settings. Per-run fields (version
    /// tag, dry run) start unset.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            service_name: settings.service_name.clone(),
            source_path: settings.source_path.clone(),
            destination_path: settings.destination_path.clone(),
            remote_host: settings.remote_host.clone(),
            enable_backup: settings.enable_backup,
            version_tag: None,
            backup_retention_days: settings.backup_retention_days,
            verify_after_copy: settings.verify_after_copy,
            max_retries: settings.max_retries,
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            service_timeout: Duration::from_secs(settings.service_timeout_secs),
            max_concurrency: settings.max_concurrency,
            enable_rollback: settings.enable_rollback,
            dry_run: false,
        }
    }

    pub fn with_version_tag(mut self, tag: impl Into<String>) -> Self {
        self.version_tag = Some(tag.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_backup(mut self, enable: bool) -> Self {
        self.enable_backup = enable;
        self
    }

    pub fn with_verify(mut self, enable: bool) -> Self {
        self.verify_after_copy = enable;
        self
    }

    pub fn with_rollback(mut self, enable: bool) -> Self {
        self.enable_rollback = enable;
        self
    }

    pub fn with_remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }

    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_service_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = timeout;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.backup_retention_days = days;
        self
    }

    /// Check the structural invariants. Whether the source exists is checked
    /// by the orchestrator.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.service_name.trim().is_empty() {
            return Err(DeployError::ValidationError(
                "Service name must not be empty".to_string(),
            ));
        }
        if self.source_path.as_os_str().is_empty() {
            return Err(DeployError::ValidationError(
                "Source path must not be empty".to_string(),
            ));
        }
        if self.destination_path.as_os_str().is_empty() {
            return Err(DeployError::ValidationError(
                "Destination path must not be empty".to_string(),
            ));
        }
        if self.source_path == self.destination_path {
            return Err(DeployError::ValidationError(format!(
                "Source and destination are the same path: {}",
                self.source_path.display()
            )));
        }
        if self.max_retries < 1 {
            return Err(DeployError::ValidationError(
                "Retry count must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency < 1 {
            return Err(DeployError::ValidationError(
                "Concurrency limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
