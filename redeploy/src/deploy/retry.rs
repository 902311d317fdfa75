//! Fixed-delay retry around a boolean operation

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::DeployError;

/// Run `operation` up to `max_attempts` times, sleeping `delay` between
/// failed attempts.
///
/// Returns `Ok(true)` on the first attempt that yields `Ok(true)` and
/// `Ok(false)` once every attempt has yielded `Ok(false)` or an error.
/// Cancellation is never retried: it aborts an attempt in flight or the
/// sleep between attempts and comes back as `Err(DeployError::Cancelled)`.
pub async fn retry<F, Fut>(
    label: &str,
    max_attempts: u32,
    delay: Duration,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<bool, DeployError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, DeployError>>,
{
    let attempts = max_attempts.max(1);

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            result = operation() => result,
        };

        match result {
            Ok(true) => {
                debug!("{} succeeded on attempt {}/{}", label, attempt, attempts);
                return Ok(true);
            }
            Ok(false) => warn!("{} failed (attempt {}/{})", label, attempt, attempts),
            Err(DeployError::Cancelled) => return Err(DeployError::Cancelled),
            Err(e) => warn!("{} errored (attempt {}/{}): {}", label, attempt, attempts, e),
        }

        if attempt < attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(DeployError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    Ok(false)
}
