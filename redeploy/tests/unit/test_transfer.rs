//! Transfer engine and verifier unit tests

use std::path::Path;
use std::sync::Mutex;

use redeploy::transfer::{FileOps, TransferEngine, TransferProgress, VerifyFailure};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

fn write(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn source_tree(root: &Path, files: usize) {
    for i in 0..files {
        write(root, &format!("dir{}/file{}.bin", i % 3, i), format!("payload {}", i).as_bytes());
    }
}

#[tokio::test]
async fn test_copy_then_verify_large_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    source_tree(&src, 50);

    let engine = TransferEngine::new();
    let cancel = CancellationToken::new();
    let seen = Mutex::new(Vec::new());
    let report = |done: usize, total: usize| seen.lock().unwrap().push((done, total));
    let report: &TransferProgress<'_> = &report;

    let outcome = assert_ok!(engine.copy_directory(&src, &dst, 8, Some(report), &cancel).await);
    assert!(outcome.success);
    assert_eq!(outcome.files_copied, 50);
    assert_eq!(outcome.files_total, 50);

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.last(), Some(&(50, 50)));
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));

    let verified = assert_ok!(engine.verify_directory(&src, &dst, 8, &cancel).await);
    assert!(verified.passed());
    assert_eq!(verified.files_checked, 50);
}

#[tokio::test]
async fn test_copy_into_non_empty_destination_keeps_extra_files() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    write(&src, "a.txt", b"new");
    write(&dst, "a.txt", b"old");
    write(&dst, "extra.txt", b"stays");

    let engine = TransferEngine::new();
    let cancel = CancellationToken::new();
    let outcome = assert_ok!(engine.copy_directory(&src, &dst, 2, None, &cancel).await);

    assert!(outcome.success);
    assert_eq!(std::fs::read(dst.join("a.txt")).unwrap(), b"new");
    assert_eq!(std::fs::read(dst.join("extra.txt")).unwrap(), b"stays");
}

#[tokio::test]
async fn test_verify_reports_missing_and_mismatched() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    write(&src, "only-in-source.txt", b"x");
    write(&dst, "placeholder", b"");

    let engine = TransferEngine::new();
    let cancel = CancellationToken::new();
    let outcome = assert_ok!(engine.verify_directory(&src, &dst, 2, &cancel).await);
    assert_eq!(
        outcome.failure,
        Some(VerifyFailure::Missing("only-in-source.txt".into()))
    );

    write(&dst, "only-in-source.txt", b"y");
    let outcome = assert_ok!(engine.verify_directory(&src, &dst, 2, &cancel).await);
    assert_eq!(
        outcome.failure,
        Some(VerifyFailure::Mismatch("only-in-source.txt".into()))
    );
}

#[tokio::test]
async fn test_verify_empty_source_passes() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::create_dir_all(&dst).unwrap();

    let engine = TransferEngine::new();
    let outcome = assert_ok!(
        engine
            .verify_directory(&src, &dst, 4, &CancellationToken::new())
            .await
    );
    assert!(outcome.passed());
    assert_eq!(outcome.files_checked, 0);
}

#[tokio::test]
async fn test_delete_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("target");
    write(&target, "nested/file.txt", b"data");

    let engine = TransferEngine::new();
    let cancel = CancellationToken::new();
    assert!(assert_ok!(engine.delete_directory(&target, &cancel).await));
    assert!(!target.exists());
    // Already gone counts as deleted
    assert!(assert_ok!(engine.delete_directory(&target, &cancel).await));
}
