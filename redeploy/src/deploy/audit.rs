//! Append-only audit log of deployment milestones

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// Severity of an audit line, mirrored to tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
    /// Rollback failed; the service needs manual attention
    Critical,
}

/// Writes `[YYYY-MM-DD HH:MM:SS] message` lines to a daily log file.
///
/// Every line is appended with a separate open, so concurrent runs writing
/// the same file never overwrite each other. Write failures are reported
/// through tracing and otherwise ignored.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    run_id: String,
}

impl AuditLog {
    /// Log file for today inside `dir`
    pub fn daily(dir: &Path, run_id: impl Into<String>) -> Self {
        let file_name = format!("deployment_{}.log", Local::now().format("%Y%m%d"));
        Self::at(dir.join(file_name), run_id)
    }

    pub fn at(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            run_id: run_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn info(&self, message: &str) {
        self.write(AuditLevel::Info, message).await;
    }

    pub async fn warn(&self, message: &str) {
        self.write(AuditLevel::Warn, message).await;
    }

    pub async fn error(&self, message: &str) {
        self.write(AuditLevel::Error, message).await;
    }

    pub async fn critical(&self, message: &str) {
        self.write(AuditLevel::Critical, message).await;
    }

    pub async fn write(&self, level: AuditLevel, message: &str) {
        let line = match level {
            AuditLevel::Info => {
                info!(run_id = %self.run_id, "{}", message);
                message.to_string()
            }
            AuditLevel::Warn => {
                warn!(run_id = %self.run_id, "{}", message);
                format!("WARNING: {}", message)
            }
            AuditLevel::Error => {
                error!(run_id = %self.run_id, "{}", message);
                format!("ERROR: {}", message)
            }
            AuditLevel::Critical => {
                error!(run_id = %self.run_id, critical = true, "{}", message);
                format!("CRITICAL: {}", message)
            }
        };

        let stamped = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), line);
        if let Err(e) = self.append(&stamped).await {
            warn!("Unable to write audit log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
