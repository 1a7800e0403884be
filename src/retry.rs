//! Retry logic with exponential backoff
//!
//! This module provides configurable retry logic for transient transport failures.
//! It implements exponential backoff with optional jitter to prevent thundering herd,
//! and stops scheduling new attempts once a [`CancellationToken`] fires.
//!
//! # Example
//!
//! ```no_run
//! use medium_harvest::retry::{IsRetryable, with_retry};
//! use medium_harvest::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{BatchItemError, DiscoveryError, TransportError, TransportErrorKind};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, dropped connections, throttling) should return `true`.
/// Permanent failures (access denied, unusable responses) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransportErrorKind {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::Timeout
                | TransportErrorKind::ConnectionFailed
                | TransportErrorKind::RateLimited
        )
    }
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl IsRetryable for DiscoveryError {
    fn is_retryable(&self) -> bool {
        match self {
            DiscoveryError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl IsRetryable for BatchItemError {
    fn is_retryable(&self) -> bool {
        match self {
            BatchItemError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Equivalent to [`with_retry_until_cancelled`] with a token that never fires.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    with_retry_until_cancelled(config, &CancellationToken::new(), operation).await
}

/// Execute an async operation with exponential backoff, honouring cancellation
///
/// # Arguments
///
/// * `config` - Retry configuration; `max_attempts` is the total number of calls
/// * `cancel` - Once cancelled, no further attempt is started and the last error is returned
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error once attempts are exhausted,
/// the error is permanent, or the token is cancelled.
pub async fn with_retry_until_cancelled<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                if cancel.is_cancelled() {
                    tracing::debug!(error = %e, attempt, "Cancelled, not retrying");
                    return Err(e);
                }

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::select! {
                    _ = tokio::time::sleep(jittered_delay) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!(error = %e, attempt, "Cancelled during backoff");
                        return Err(e);
                    }
                }

                attempt += 1;
                delay = next_delay(config, delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Exponential step, capped at `max_delay`
fn next_delay(config: &RetryConfig, delay: Duration) -> Duration {
    let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
    next.min(config.max_delay)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay,
/// so the actual delay lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
