//! Retry policies for connector resilience.
//!
//! Provides utilities to handle transient failures in connector operations:
//! - [`RetryPolicy`]: Retry limit with doubling backoff
//! - [`with_retry_if_and_handler`]: Async helper that retries operations the
//!   classifier accepts and propagates everything else immediately

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ConnectorError;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(480);

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial attempt).
    pub max_attempts: usize,
    /// Initial delay before first retry.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Creates a doubling backoff policy.
    ///
    /// Delays are `initial_backoff * 2^(attempt - 1)`, capped at 8 minutes.
    #[must_use]
    pub fn exponential(max_attempts: usize, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }

    /// Calculates the delay for a given attempt number.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
    }

    /// Returns `true` if we should retry after the given attempt.
    #[must_use]
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

/// Executes an async operation, retrying failures accepted by `is_retryable`
/// and calling `on_retry` before each backoff sleep.
///
/// Each retry is logged at `warn` with the operation name, attempt number
/// and delay. The handler receives the upcoming retry number (starting at 1)
/// and the error that triggered it, allowing metrics collection.
///
/// # Errors
///
/// Returns the first non-retryable `ConnectorError` unchanged, or the last
/// retryable one once the policy is exhausted.
///
/// # Example
///
/// ```rust,ignore
/// let policy = RetryPolicy::exponential(5, Duration::from_secs(2));
/// let page = with_retry_if_and_handler(&policy, "reports.batchGet", || api.batch_get(&req),
///     ConnectorError::is_transient, |_, _| retries += 1).await?;
/// ```
pub async fn with_retry_if_and_handler<F, T, Fut, C, H>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
    is_retryable: C,
    mut on_retry: H,
) -> Result<T, ConnectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
    C: Fn(&ConnectorError) -> bool,
    H: FnMut(usize, &ConnectorError),
{
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if !policy.should_retry(attempt) => {
                warn!(
                    operation,
                    attempts = attempt + 1,
                    error = %e,
                    "giving up after exhausting retries"
                );
                return Err(e);
            }
            Err(e) => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "retrying after transient error"
                );
                on_retry(attempt, &e);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn no_retry(_: usize, _: &ConnectorError) {}

    #[test]
    fn test_retry_policy_exponential() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(2));

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy::exponential(20, Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(480));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_secs(480));
    }

    #[test]
    fn test_zero_backoff() {
        let policy = RetryPolicy::exponential(3, Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100));

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test]
    async fn test_success_without_retry() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(1));
        let result = with_retry_if_and_handler(
            &policy,
            "noop",
            || async { Ok::<_, ConnectorError>(42) },
            ConnectorError::is_transient,
            no_retry,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_success() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(2));
        let calls = AtomicUsize::new(0);
        let mut seen = Vec::new();

        let result = with_retry_if_and_handler(
            &policy,
            "reports.batchGet",
            || {
                let n = calls.fetch_add(1, Ordering::Relaxed);
                async move {
                    if n < 2 {
                        Err(ConnectorError::ServerError {
                            status: 503,
                            message: "backend error".into(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            },
            ConnectorError::is_transient,
            |attempt, _| seen.push(attempt),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_error() {
        let policy = RetryPolicy::exponential(2, Duration::from_secs(2));
        let calls = AtomicUsize::new(0);

        let result = with_retry_if_and_handler(
            &policy,
            "reports.batchGet",
            || {
                let n = calls.fetch_add(1, Ordering::Relaxed);
                async move { Err::<i32, _>(ConnectorError::RateLimited(format!("attempt {n}"))) }
            },
            ConnectorError::is_transient,
            no_retry,
        )
        .await;

        // Initial call + 2 retries.
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        match result {
            Err(ConnectorError::RateLimited(msg)) => assert_eq!(msg, "attempt 2"),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_never_retries_auth_errors() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result = with_retry_if_and_handler(
            &policy,
            "oauth.token",
            || {
                calls.fetch_add(1, Ordering::Relaxed);
                async { Err::<i32, _>(ConnectorError::AuthenticationFailed("401".into())) }
            },
            ConnectorError::is_transient,
            no_retry,
        )
        .await;

        assert!(matches!(result, Err(ConnectorError::AuthenticationFailed(_))));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
