//! Stage machine unit tests

use redeploy::deploy::stage::{Stage, StageMachine};

#[test]
fn test_stage_initial_state() {
    let stages = StageMachine::new();
    assert_eq!(stages.stage(), Stage::Starting);
    assert_eq!(stages.history(), &[Stage::Starting]);
}

#[test]
fn test_stage_full_success_flow() {
    let mut stages = StageMachine::new();

    for next in [
        Stage::StoppingService,
        Stage::CreatingBackup,
        Stage::CopyingFiles,
        Stage::VerifyingFiles,
        Stage::StartingService,
        Stage::Completed,
    ] {
        stages.advance(next).unwrap();
        assert_eq!(stages.stage(), next);
    }
    assert_eq!(stages.history().len(), 7);
}

#[test]
fn test_stage_optional_stages_can_be_skipped() {
    let mut stages = StageMachine::new();
    stages.advance(Stage::StoppingService).unwrap();
    stages.advance(Stage::CopyingFiles).unwrap();
    stages.advance(Stage::StartingService).unwrap();
    stages.advance(Stage::Completed).unwrap();
    assert_eq!(stages.stage(), Stage::Completed);
}

#[test]
fn test_stage_failure_from_any_active_stage() {
    let mut stages = StageMachine::new();
    stages.advance(Stage::StoppingService).unwrap();
    stages.advance(Stage::CopyingFiles).unwrap();
    stages.advance(Stage::Failed).unwrap();
    assert!(stages.stage().is_terminal());
}

#[test]
fn test_stage_invalid_transitions() {
    let mut stages = StageMachine::new();

    // Completed is only reachable from StartingService
    assert!(stages.advance(Stage::Completed).is_err());

    stages.advance(Stage::CopyingFiles).unwrap();
    // No going back
    assert!(stages.advance(Stage::CreatingBackup).is_err());
    // No re-entry
    assert!(stages.advance(Stage::CopyingFiles).is_err());
    assert_eq!(stages.stage(), Stage::CopyingFiles);

    stages.advance(Stage::Failed).unwrap();
    // Terminal stages accept nothing
    assert!(stages.advance(Stage::StartingService).is_err());
    assert!(stages.advance(Stage::Failed).is_err());
}
