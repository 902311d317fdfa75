//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Prefix of environment variables that override the settings file
pub const ENV_PREFIX: &str = "REDEPLOY_";

/// Process-wide defaults for deployments. Loaded once at startup and never
/// written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Service to stop and restart
    #[serde(default)]
    pub service_name: String,

    /// Directory holding the new build
    #[serde(default)]
    pub source_path: PathBuf,

    /// Directory the service runs from
    #[serde(default)]
    pub destination_path: PathBuf,

    /// Host running the service, when not implied by the destination
    #[serde(default)]
    pub remote_host: Option<String>,

    #[serde(default = "default_true")]
    pub enable_backup: bool,

    #[serde(default = "default_retention_days")]
    pub backup_retention_days: u32,

    #[serde(default = "default_true")]
    pub verify_after_copy: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_service_timeout")]
    pub service_timeout_secs: u64,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_true")]
    pub enable_rollback: bool,

    /// Wait after starting the service before checking its status
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Audit log directory; the storage layout's logs dir when unset
    #[serde(default)]
    pub audit_log_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_service_timeout() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_settle_delay() -> u64 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: String::new(),
            source_path: PathBuf::new(),
            destination_path: PathBuf::new(),
            remote_host: None,
            enable_backup: true,
            backup_retention_days: default_retention_days(),
            verify_after_copy: true,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            service_timeout_secs: default_service_timeout(),
            max_concurrency: default_max_concurrency(),
            enable_rollback: true,
            settle_delay_secs: default_settle_delay(),
            audit_log_dir: None,
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, DeployError> {
        let file = File::new(path);
        if !file.exists().await {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Apply `REDEPLOY_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), DeployError> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from `lookup`, keyed without the prefix
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), DeployError> {
        if let Some(v) = lookup("SERVICE_NAME") {
            self.service_name = v;
        }
        if let Some(v) = lookup("SOURCE") {
            self.source_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DESTINATION") {
            self.destination_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REMOTE_HOST") {
            self.remote_host = Some(v).filter(|h| !h.trim().is_empty());
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v.parse().map_err(DeployError::ConfigError)?;
        }
        if let Some(v) = lookup("MAX_CONCURRENCY") {
            self.max_concurrency = parse_number("MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            self.max_retries = parse_number("MAX_RETRIES", &v)?;
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DeployError> {
    value.trim().parse().map_err(|_| {
        DeployError::ConfigError(format!("{}{} is not a valid number: {}", ENV_PREFIX, key, value))
    })
}
