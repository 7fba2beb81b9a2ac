use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::jitter;

use crate::error::AppError;

/// `base_delay_ms * 2^attempt`, attempt starting at 0 for the first retry.
fn backoff_delay(base_delay_ms: u64, attempt: usize) -> Duration {
    let millis = base_delay_ms.saturating_mul(1u64 << attempt.min(20));
    jitter(Duration::from_millis(millis))
}

/// Retry policy: exponential backoff (`base * 2^attempt`) plus jitter,
/// capped at `max_retries` additional attempts beyond the first try.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_retries: usize,
}

impl RetryPolicy {
    pub const fn new(base_delay_ms: u64, max_retries: usize) -> Self {
        Self {
            base_delay_ms,
            max_retries,
        }
    }

    /// The default used by the search adapter: base 400ms, x2, max 2
    /// retries.
    pub const fn search_default() -> Self {
        Self::new(400, 2)
    }
}

/// Runs `op` with retry-with-backoff, retrying only while `is_retryable`
/// returns true for the error and the cancellation signal has not fired.
/// Sleeps between attempts are themselves cancellable.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    cancelled: impl Fn() -> bool,
    mut op: F,
    is_retryable: impl Fn(&AppError) -> bool,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0usize;
    loop {
        if cancelled() {
            return Err(AppError::Cancelled);
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && is_retryable(&err) => {
                let delay = backoff_delay(policy.base_delay_ms, attempt);
                attempt += 1;
                if cancelled() {
                    return Err(AppError::Cancelled);
                }
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Wraps a future with a timeout, mapping elapsed time into
/// `AppError::Timeout`.
pub async fn with_timeout<T>(
    duration: Duration,
    fut: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_up_to_max() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(1, 2);
        let result: Result<(), AppError> = retry_with_backoff(
            policy,
            || false,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::UpstreamTransient("boom".into())) }
            },
            AppError::is_transient,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(1, 2);
        let result: Result<(), AppError> = retry_with_backoff(
            policy,
            || false,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::Validation("bad".into())) }
            },
            AppError::is_transient,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(1, 3);
        let result = retry_with_backoff(
            policy,
            || false,
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::UpstreamTransient("boom".into()))
                    } else {
                        Ok(42)
                    }
                }
            },
            AppError::is_transient,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn timeout_wraps_slow_future() {
        let result: Result<(), AppError> = with_timeout(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
    }
}
