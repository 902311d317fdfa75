//! Backup manager unit tests

use std::path::Path;
use std::sync::Arc;

use redeploy::backup::naming::{backup_root_for, is_backup_name};
use redeploy::backup::{BackupManager, BackupStore};
use redeploy::transfer::TransferEngine;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn manager() -> BackupManager {
    BackupManager::new(Arc::new(TransferEngine::new()), 4)
}

#[tokio::test]
async fn test_backup_lands_next_to_destination() {
    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().join("app");
    write(&dest, "bin/app", "v1");

    let cancel = CancellationToken::new();
    let backup = assert_ok!(manager().create_backup(&dest, Some("1.2.0"), &cancel).await)
        .expect("backup path");

    assert_eq!(backup.parent(), Some(backup_root_for(&dest).as_path()));
    let name = backup.file_name().unwrap().to_string_lossy().to_string();
    assert!(is_backup_name(&name));
    assert!(name.starts_with("Backup_v1.2.0_"));
    assert_eq!(std::fs::read_to_string(backup.join("bin/app")).unwrap(), "v1");
}

#[tokio::test]
async fn test_backup_then_restore_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().join("app");
    write(&dest, "a.txt", "original");

    let store = manager();
    let cancel = CancellationToken::new();
    let backup = assert_ok!(store.create_backup(&dest, None, &cancel).await).unwrap();

    write(&dest, "a.txt", "broken");
    write(&dest, "new.txt", "added by the failed deployment");

    assert!(assert_ok!(store.restore_backup(&backup, &dest, &cancel).await));
    assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "original");
    assert!(!dest.join("new.txt").exists());
    // The backup itself survives a restore
    assert!(backup.join("a.txt").exists());
}

#[tokio::test]
async fn test_cleanup_ignores_unrelated_folders() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("Backups");
    std::fs::create_dir_all(root.join("Backup_20000101_000000")).unwrap();
    std::fs::create_dir_all(root.join("notes")).unwrap();

    let report = manager().clean_old_backups(&root, 7).await;
    assert_eq!(report.removed, vec![root.join("Backup_20000101_000000")]);
    assert!(report.failed.is_empty());
    assert!(root.join("notes").exists());
}

#[tokio::test]
async fn test_cancelled_backup_propagates() {
    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().join("app");
    write(&dest, "a.txt", "x");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = manager().create_backup(&dest, None, &cancel).await;
    assert!(result.is_err());
}
