//! Run output: progress events and the final result

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deploy::stage::Stage;

/// One progress event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentProgress {
    pub message: String,
    /// 0-100, non-decreasing within a run
    pub percent: u8,
    pub stage: Stage,
}

/// Receives progress events. Called on the deploying task, never concurrently.
pub type ProgressSink<'a> = &'a (dyn Fn(DeploymentProgress) + Send + Sync);

/// What happened to the rollback of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// Run succeeded, or rollback was disabled or impossible
    NotAttempted,
    /// Destination restored and service started again
    Restored,
    /// Destination restored but the service did not start
    RestoredServiceNotStarted,
    /// Destination could not be restored
    RestoreFailed,
}

impl RollbackOutcome {
    /// The service may be stopped or running inconsistent files
    pub fn is_unrecoverable(self) -> bool {
        matches!(
            self,
            RollbackOutcome::RestoredServiceNotStarted | RollbackOutcome::RestoreFailed
        )
    }
}

/// Result of one deployment run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub success: bool,
    /// Set whenever `success` is false
    pub error_message: Option<String>,
    /// Set whenever a backup was taken, regardless of outcome
    pub backup_path: Option<PathBuf>,
    pub files_copied: usize,
    pub duration: Duration,
    /// Whether the service reported running after the final start
    pub service_running: bool,
    pub final_stage: Stage,
    pub rollback: RollbackOutcome,
}

/// Forwards progress to a sink, clamping percentages so the sink never sees
/// a value lower than one it already received.
pub(crate) struct ProgressReporter<'a> {
    sink: ProgressSink<'a>,
    high_water: AtomicU8,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: ProgressSink<'a>) -> Self {
        Self {
            sink,
            high_water: AtomicU8::new(0),
        }
    }

    pub(crate) fn report(&self, stage: Stage, percent: u8, message: impl Into<String>) {
        let requested = percent.min(100);
        let previous = self.high_water.fetch_max(requested, Ordering::AcqRel);
        (self.sink)(DeploymentProgress {
            message: message.into(),
            percent: requested.max(previous),
            stage,
        });
    }
}

/// Copy progress maps onto 40-70%
pub(crate) fn copy_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 70;
    }
    let fraction = done.min(total) as f64 / total as f64;
    (40.0 + 30.0 * fraction).floor() as u8
}
