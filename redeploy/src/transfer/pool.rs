//! Fixed-size worker pool over a list of relative paths

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::DeployError;

/// Set-once failure slot shared by workers.
///
/// The flag is claimed with a compare-and-set so only the first failing
/// worker stores its diagnostic; later failures are dropped.
#[derive(Debug)]
pub struct FirstFailure<T> {
    failed: AtomicBool,
    first: OnceLock<T>,
}

impl<T> FirstFailure<T> {
    pub fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
            first: OnceLock::new(),
        }
    }

    /// Record a failure. Returns true if this call was the first.
    pub fn record(&self, failure: T) -> bool {
        if self
            .failed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = self.first.set(failure);
            true
        } else {
            false
        }
    }

    pub fn is_set(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn get(&self) -> Option<&T> {
        self.first.get()
    }
}

impl<T: Clone> FirstFailure<T> {
    pub fn cloned(&self) -> Option<T> {
        self.first.get().cloned()
    }
}

impl<T> Default for FirstFailure<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `unit` over every item with at most `limit` units in flight.
///
/// Exactly `min(limit, items.len())` worker tasks are spawned; each claims
/// the next item index with an atomic increment. Workers stop claiming work
/// once `cancel` fires or any failure is recorded, but finish the file they
/// are on. `on_done` is called on the calling task with a non-decreasing
/// completion count. Returns the number of units that completed.
pub async fn run_bounded<T, F, Fut>(
    items: Vec<PathBuf>,
    limit: usize,
    cancel: &CancellationToken,
    failure: Arc<FirstFailure<T>>,
    mut on_done: impl FnMut(usize),
    unit: F,
) -> Result<usize, DeployError>
where
    T: Send + Sync + 'static,
    F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), T>> + Send + 'static,
{
    let workers = limit.max(1).min(items.len());
    let items = Arc::new(items);
    let next = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let unit = Arc::new(unit);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<usize>();

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let items = items.clone();
        let next = next.clone();
        let done = done.clone();
        let failure = failure.clone();
        let unit = unit.clone();
        let done_tx = done_tx.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            loop {
                if cancel.is_cancelled() || failure.is_set() {
                    break;
                }
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(item) = items.get(index) else {
                    break;
                };
                match (*unit)(item.clone()).await {
                    Ok(()) => {
                        let count = done.fetch_add(1, Ordering::AcqRel) + 1;
                        let _ = done_tx.send(count);
                    }
                    Err(err) => {
                        failure.record(err);
                        break;
                    }
                }
            }
            debug!("Worker {} finished", worker);
        });
    }
    drop(done_tx);

    let mut reported = 0;
    while let Some(count) = done_rx.recv().await {
        if count > reported {
            reported = count;
            on_done(reported);
        }
    }

    while let Some(joined) = set.join_next().await {
        joined.map_err(|e| DeployError::Internal(format!("worker task failed: {}", e)))?;
    }

    if cancel.is_cancelled() {
        return Err(DeployError::Cancelled);
    }

    Ok(done.load(Ordering::Acquire))
}
