//! Bounded retry with backoff and cancellation
//!
//! [`retry_with_backoff`] runs an operation up to a fixed number of attempts,
//! sleeping between attempts for a delay chosen by the policy's backoff
//! function. Cancellation always wins: a cancelled token ends the loop
//! before the next attempt or in the middle of a backoff sleep.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

type BackoffFn = dyn Fn(u32) -> Duration + Send + Sync;

/// Attempt count plus a backoff function of the attempt index
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Arc<BackoffFn>,
}

impl RetryPolicy {
    /// Policy with an arbitrary backoff; `backoff(n)` is the delay after attempt `n` (1-based)
    pub fn new<F>(max_attempts: u32, backoff: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
        }
    }

    /// Delay grows linearly: `attempt * step`
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self::new(max_attempts, move |attempt| step.saturating_mul(attempt))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_secs(1))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("first_delay", &self.delay_after(1))
            .finish()
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Cancelled before or between attempts
    Interrupted { attempts: u32 },

    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error that retrying cannot fix
    Aborted { attempts: u32, error: E },
}

/// Runs `operation` until it succeeds, fails permanently, runs out of
/// attempts, or `cancel` fires
///
/// `operation` receives the 1-based attempt number. `label` names the
/// operation in log output.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Interrupted {
                attempts: attempt - 1,
            });
        }

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() {
            return Err(RetryError::Aborted { attempts: attempt, error });
        }

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            "Failed to fetch {} on attempt {}/{}: {}. Retrying in {:?}...",
            label,
            attempt,
            max_attempts,
            error,
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Retry wait for {} interrupted", label);
                return Err(RetryError::Interrupted { attempts: attempt });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.transient
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(3));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::linear(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&policy, &cancel, "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(TestError { transient: true })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let result: Result<(), _> = retry_with_backoff(&policy, &cancel, "test", |_| async {
            Err(TestError { transient: true })
        })
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&policy, &cancel, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { transient: false }) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Aborted { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_wins() {
        // A long backoff that would dominate the test if it were not interrupted
        let policy = RetryPolicy::linear(3, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result: Result<(), _> = retry_with_backoff(&policy, &cancel, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { transient: true }) }
        })
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Interrupted { attempts: 1 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        // The token stays cancelled for everyone else
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), RetryError<TestError>> =
            retry_with_backoff(&policy, &cancel, "test", |_| async { Ok(()) }).await;

        assert!(matches!(
            result,
            Err(RetryError::Interrupted { attempts: 0 })
        ));
    }

    #[test]
    fn test_custom_backoff_function() {
        let policy = RetryPolicy::new(4, |attempt| Duration::from_millis(u64::from(attempt * attempt)));
        assert_eq!(policy.delay_after(3), Duration::from_millis(9));
    }
}
