//! Deployment stages and the transitions allowed between them

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Starting,
    StoppingService,
    CreatingBackup,
    CopyingFiles,
    VerifyingFiles,
    StartingService,
    Completed,
    Failed,
}

impl Stage {
    /// Position in the linear workflow; terminal stages sort last
    fn ordinal(self) -> u8 {
        match self {
            Stage::Starting => 0,
            Stage::StoppingService => 1,
            Stage::CreatingBackup => 2,
            Stage::CopyingFiles => 3,
            Stage::VerifyingFiles => 4,
            Stage::StartingService => 5,
            Stage::Completed => 6,
            Stage::Failed => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Starting => "Starting",
            Stage::StoppingService => "Stopping service",
            Stage::CreatingBackup => "Creating backup",
            Stage::CopyingFiles => "Copying files",
            Stage::VerifyingFiles => "Verifying files",
            Stage::StartingService => "Starting service",
            Stage::Completed => "Completed",
            Stage::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Tracks the current stage of one run.
///
/// Stages only move forward. Optional stages may be skipped, `Failed` can be
/// entered from any non-terminal stage, and `Completed` only follows
/// `StartingService`. Terminal stages accept no further transitions.
#[derive(Debug, Clone)]
pub struct StageMachine {
    stage: Stage,
    history: Vec<Stage>,
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            stage: Stage::Starting,
            history: vec![Stage::Starting],
        }
    }

    /// Get current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every stage entered so far, in order
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// Move to `next`
    pub fn advance(&mut self, next: Stage) -> Result<(), String> {
        let allowed = match (self.stage, next) {
            (current, _) if current.is_terminal() => false,
            (_, Stage::Failed) => true,
            (Stage::StartingService, Stage::Completed) => true,
            (_, Stage::Completed) => false,
            (current, next) => next.ordinal() > current.ordinal(),
        };

        if !allowed {
            return Err(format!("Invalid transition: {:?} -> {:?}", self.stage, next));
        }

        self.stage = next;
        self.history.push(next);
        Ok(())
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}
