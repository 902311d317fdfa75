//! Retry policy unit tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use redeploy::deploy::retry::retry;
use redeploy::errors::DeployError;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_retry_succeeds_on_third_attempt() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();

    let result = retry("op", 3, Duration::from_millis(1), &cancel, || async {
        Ok(calls.fetch_add(1, Ordering::SeqCst) == 2)
    })
    .await;

    assert!(matches!(result, Ok(true)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();

    let result = retry("op", 3, Duration::from_millis(1), &cancel, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    })
    .await;

    assert!(matches!(result, Ok(false)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_zero_attempts_runs_once() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();

    let _ = retry("op", 0, Duration::from_millis(1), &cancel, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    })
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_cancellation_is_not_retried() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();

    let result = retry("op", 5, Duration::from_millis(1), &cancel, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(DeployError::Cancelled)
    })
    .await;

    assert!(matches!(result, Err(DeployError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_already_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = retry("op", 3, Duration::from_millis(1), &cancel, || async { Ok(true) }).await;
    assert!(matches!(result, Err(DeployError::Cancelled)));
}
