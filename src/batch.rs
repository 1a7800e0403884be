//! Bounded-concurrency batch runner
//!
//! [`run`] drives one worker future per input item with at most
//! `concurrency` in flight. A failing item never affects its siblings, and the
//! result keeps input order regardless of completion order. Progress is
//! reported from the single collecting loop, once per finished item.
//!
//! Cancellation is cooperative: once the token fires, items that have not
//! started yet are recorded as [`ItemOutcome::Skipped`], while items already
//! running finish normally.

use crate::error::BatchItemError;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Knobs for a single [`run`]
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Maximum workers in flight; 0 is treated as 1
    pub concurrency: usize,
    /// Stops queued items from starting once cancelled
    pub cancel: CancellationToken,
}

impl BatchOptions {
    /// Options with the given concurrency and a fresh token
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            cancel: CancellationToken::new(),
        }
    }
}

/// What happened to one input item
#[derive(Debug)]
pub enum ItemOutcome<R> {
    /// The worker returned a value
    Succeeded(R),
    /// The worker returned an error
    Failed(BatchItemError),
    /// The batch was cancelled before the item started
    Skipped,
}

impl<R> ItemOutcome<R> {
    /// The value of a successful item
    pub fn value(&self) -> Option<&R> {
        match self {
            ItemOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    /// The error of a failed item
    pub fn error(&self) -> Option<&BatchItemError> {
        match self {
            ItemOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the item was never started
    pub fn is_skipped(&self) -> bool {
        matches!(self, ItemOutcome::Skipped)
    }
}

/// Snapshot handed to the progress callback after each finished item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// Items finished so far (success or failure)
    pub completed: usize,
    /// Items in the batch
    pub total: usize,
    /// Items that succeeded so far
    pub succeeded: usize,
    /// Items that failed so far, conversion failures included
    pub failed: usize,
    /// Failed items whose page was fetched but did not convert
    pub parse_failed: usize,
}

/// Outcome of a whole batch
#[derive(Debug)]
pub struct BatchResult<R> {
    /// One outcome per input item, in input order
    pub items: Vec<ItemOutcome<R>>,
    /// Items whose worker ran
    pub attempted: usize,
    /// Items whose worker returned `Ok`
    pub succeeded: usize,
    /// Items whose worker returned `Err`
    pub failed: usize,
    /// Part of `failed` reported as [`BatchItemError::Conversion`]
    pub parse_failed: usize,
    /// Items never started because of cancellation
    pub skipped: usize,
    /// Wall-clock time of the batch
    pub elapsed: Duration,
    /// Whether the cancellation token had fired by the end of the batch
    pub cancelled: bool,
}

/// Run `worker` over every item with bounded concurrency
///
/// # Examples
///
/// ```
/// use medium_harvest::batch::{run, BatchOptions};
/// use medium_harvest::error::BatchItemError;
///
/// # #[tokio::main]
/// # async fn main() {
/// let result = run(
///     vec![1, 2, 3],
///     |n: u32| async move { Ok::<_, BatchItemError>(n * 10) },
///     &BatchOptions::new(2),
///     |progress| println!("{}/{}", progress.completed, progress.total),
/// )
/// .await;
///
/// assert_eq!(result.succeeded, 3);
/// assert_eq!(result.items[2].value(), Some(&30));
/// # }
/// ```
pub async fn run<T, R, F, Fut, P>(
    items: Vec<T>,
    worker: F,
    options: &BatchOptions,
    mut on_progress: P,
) -> BatchResult<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, BatchItemError>>,
    P: FnMut(BatchProgress),
{
    let started = Instant::now();
    let total = items.len();
    let concurrency = options.concurrency.max(1);

    let permits = Semaphore::new(concurrency);
    let permits = &permits;
    let worker = &worker;
    let cancel = &options.cancel;

    let mut outcomes: Vec<Option<ItemOutcome<R>>> = (0..total).map(|_| None).collect();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut parse_failed = 0;

    let mut finished = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| async move {
            if cancel.is_cancelled() {
                return (index, None);
            }
            let Ok(_permit) = permits.acquire().await else {
                return (index, None);
            };
            if cancel.is_cancelled() {
                return (index, None);
            }
            (index, Some(worker(item).await))
        })
        .buffer_unordered(concurrency);

    while let Some((index, result)) = finished.next().await {
        let outcome = match result {
            None => ItemOutcome::Skipped,
            Some(Ok(value)) => {
                succeeded += 1;
                ItemOutcome::Succeeded(value)
            }
            Some(Err(e)) => {
                failed += 1;
                if matches!(e, BatchItemError::Conversion { .. }) {
                    parse_failed += 1;
                }
                tracing::warn!(item = index, error = %e, "Batch item failed");
                ItemOutcome::Failed(e)
            }
        };

        if !outcome.is_skipped() {
            on_progress(BatchProgress {
                completed: succeeded + failed,
                total,
                succeeded,
                failed,
                parse_failed,
            });
        }
        if let Some(slot) = outcomes.get_mut(index) {
            *slot = Some(outcome);
        }
    }

    let items: Vec<ItemOutcome<R>> = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap_or(ItemOutcome::Skipped))
        .collect();
    let skipped = items.iter().filter(|o| o.is_skipped()).count();
    let elapsed = started.elapsed();
    let cancelled = cancel.is_cancelled();

    tracing::info!(
        total,
        succeeded,
        failed,
        parse_failed,
        skipped,
        cancelled,
        elapsed_ms = elapsed.as_millis() as u64,
        "Batch finished"
    );

    BatchResult {
        items,
        attempted: succeeded + failed,
        succeeded,
        failed,
        parse_failed,
        skipped,
        elapsed,
        cancelled,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn double_unless_four(i: usize) -> Result<usize, BatchItemError> {
        // later items finish first so completion order differs from input order
        tokio::time::sleep(Duration::from_millis((10 - i as u64) * 2)).await;
        if i == 4 {
            Err(BatchItemError::Other("item four".to_string()))
        } else {
            Ok(i * 2)
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_and_order_is_kept() {
        let result = run(
            (0..10).collect(),
            double_unless_four,
            &BatchOptions::new(3),
            |_| {},
        )
        .await;

        assert_eq!(result.items.len(), 10);
        assert_eq!(result.succeeded, 9);
        assert_eq!(result.failed, 1);
        assert_eq!(result.attempted, 10);
        assert_eq!(result.parse_failed, 0);
        assert_eq!(result.skipped, 0);
        assert!(!result.cancelled);

        for (i, outcome) in result.items.iter().enumerate() {
            if i == 4 {
                assert_eq!(outcome.error().unwrap().to_string(), "item four");
            } else {
                assert_eq!(outcome.value(), Some(&(i * 2)));
            }
        }
    }

    #[tokio::test]
    async fn progress_is_reported_once_per_item() {
        let mut seen = Vec::new();
        run(
            (0..10).collect(),
            double_unless_four,
            &BatchOptions::new(3),
            |p| seen.push(p),
        )
        .await;

        assert_eq!(seen.len(), 10);
        for (n, progress) in seen.iter().enumerate() {
            assert_eq!(progress.completed, n + 1);
            assert_eq!(progress.total, 10);
            assert_eq!(progress.succeeded + progress.failed, progress.completed);
        }
        let last = seen.last().unwrap();
        assert_eq!((last.succeeded, last.failed), (9, 1));
    }

    #[tokio::test]
    async fn conversion_failures_are_tallied_apart() {
        let mut last = None;
        let result = run(
            (0..6).collect::<Vec<usize>>(),
            |i| async move {
                match i % 3 {
                    0 => Ok(i),
                    1 => Err(BatchItemError::Conversion {
                        reason: "title missing".to_string(),
                    }),
                    _ => Err(BatchItemError::UnsafeUrl(format!("item {}", i))),
                }
            },
            &BatchOptions::new(2),
            |p| last = Some(p),
        )
        .await;

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 4);
        assert_eq!(result.parse_failed, 2);

        let last = last.unwrap();
        assert_eq!((last.failed, last.parse_failed), (4, 2));
    }

    async fn track_peak(in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn concurrency_cap_is_never_exceeded() {
        for (cap, expected_peak) in [(3, 3), (0, 1)] {
            let in_flight = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let result = run(
                (0..12).collect::<Vec<usize>>(),
                |i| {
                    let (in_flight, peak) = (Arc::clone(&in_flight), Arc::clone(&peak));
                    async move {
                        track_peak(in_flight, peak).await;
                        Ok::<_, BatchItemError>(i)
                    }
                },
                &BatchOptions::new(cap),
                |_| {},
            )
            .await;

            assert_eq!(result.succeeded, 12);
            assert_eq!(peak.load(Ordering::SeqCst), expected_peak, "cap {}", cap);
        }
    }

    #[tokio::test]
    async fn cancellation_skips_queued_items() {
        let options = BatchOptions::new(1);
        let token = options.cancel.clone();
        let mut progress_calls = 0;

        let result = run(
            (0..5).collect::<Vec<usize>>(),
            |i| {
                let token = token.clone();
                async move {
                    if i == 1 {
                        token.cancel();
                    }
                    Ok::<_, BatchItemError>(i)
                }
            },
            &options,
            |_| progress_calls += 1,
        )
        .await;

        assert!(result.cancelled);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.skipped, 3);
        assert_eq!(result.attempted, 2);
        assert_eq!(progress_calls, 2);
        assert_eq!(result.items[1].value(), Some(&1));
        assert!(result.items[2..].iter().all(ItemOutcome::is_skipped));
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let options = BatchOptions::new(4);
        options.cancel.cancel();
        let calls = AtomicUsize::new(0);

        let result = run(
            vec!["a", "b", "c"],
            |s| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, BatchItemError>(s) }
            },
            &options,
            |_| panic!("no progress for skipped items"),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.skipped, 3);
        assert!(result.cancelled);
    }

    #[tokio::test]
    async fn empty_batch() {
        let result = run(
            Vec::<u8>::new(),
            |n| async move { Ok::<_, BatchItemError>(n) },
            &BatchOptions::new(2),
            |_| {},
        )
        .await;

        assert!(result.items.is_empty());
        assert_eq!(result.attempted, 0);
        assert!(!result.cancelled);
    }
}
