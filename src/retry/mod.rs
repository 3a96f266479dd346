//! Retry scheduler for contended store writes.
//!
//! Only [`StoreError::Conflict`] is retried. Each retry waits on the Tokio
//! timer (the task yields, no thread blocks) and doubles the delay.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{CacheError, RequestFailure, TemporaryError};
use crate::policy::CachePolicy;
use crate::store::StoreError;

/// Smallest delay ever scheduled between two attempts.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Remaining retry budget and the delay before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub retries_left: u32,
    pub delay: Duration,
}

impl RetryState {
    /// A budget of `retries_left` retries, the first after `delay`.
    pub fn new(retries_left: u32, delay: Duration) -> Self {
        Self {
            retries_left,
            delay,
        }
    }

    /// The initial state for a write governed by `policy`.
    pub fn from_policy(policy: &CachePolicy) -> Self {
        Self::new(policy.retry_count(), policy.initial_retry_delay())
    }

    /// The state after one more contention, or `None` if the budget is spent.
    pub fn next(self) -> Option<Self> {
        let retries_left = self.retries_left.checked_sub(1)?;
        Some(Self {
            retries_left,
            delay: next_delay(self.delay),
        })
    }
}

/// Doubles `delay`, never going below [`MIN_RETRY_DELAY`].
pub fn next_delay(delay: Duration) -> Duration {
    delay.saturating_mul(2).max(MIN_RETRY_DELAY)
}

/// Runs `action` until it succeeds, fails permanently, or contention
/// outlasts the budget in `state`.
///
/// Before each backoff wait `on_temporary` receives a [`TemporaryError`]
/// carrying the retries left after this one and the delay about to be
/// slept.
///
/// # Errors
///
/// - [`CacheError::ContentionExhausted`]: a conflict arrived with no retries left.
/// - [`CacheError::Request`]: any non-conflict store failure, without retry.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rcache::retry::{run_with_retry, RetryState};
/// use rcache::store::StoreError;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() {
/// let mut conflicts = 1;
/// let result = run_with_retry(
///     || {
///         let outcome = if conflicts > 0 {
///             conflicts -= 1;
///             Err(StoreError::Conflict { key: "k".into() })
///         } else {
///             Ok("saved")
///         };
///         async move { outcome }
///     },
///     RetryState::new(3, Duration::from_secs(1)),
///     |notice| assert_eq!(notice.retries_left, 2),
/// )
/// .await;
/// assert_eq!(result.unwrap(), "saved");
/// # }
/// ```
pub async fn run_with_retry<T, F, Fut, N>(
    mut action: F,
    mut state: RetryState,
    mut on_temporary: N,
) -> Result<T, CacheError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
    N: FnMut(TemporaryError),
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let err = match action().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempts, "write succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_conflict() => err,
            Err(err) => {
                warn!(attempts, error = %err, "write failed permanently");
                return Err(RequestFailure::Store(err).into());
            }
        };

        let Some(next) = state.next() else {
            warn!(attempts, error = %err, "write contention exhausted retry budget");
            return Err(CacheError::ContentionExhausted {
                attempts,
                cause: err,
            });
        };

        warn!(
            attempts,
            retries_left = next.retries_left,
            delay = ?state.delay,
            "write contended, backing off"
        );
        on_temporary(TemporaryError {
            cause: err,
            retries_left: next.retries_left,
            delay: state.delay,
        });
        tokio::time::sleep(state.delay).await;
        state = next;
    }
}
