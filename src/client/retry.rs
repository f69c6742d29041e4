use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::traits::FetchError;

/// Bounded retry with linear backoff: the wait before retry `n` is `base * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(RetryConfig::default())
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(retry)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Worst-case total sleep across all retries.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries).fold(Duration::ZERO, |acc, n| acc.saturating_add(self.delay(n)))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are used up. Errors report the number of attempts made.
pub async fn retrying<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt <= policy.max_retries => {
                let delay = policy.delay(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err.with_attempts(attempt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> FetchError {
        FetchError::Transient {
            url: "u".into(),
            reason: "connection reset".into(),
            attempts: 0,
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(300));
        assert_eq!(policy.total_backoff(), Duration::from_millis(600));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = retrying(&policy, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        };

        let result: Result<(), _> = retrying(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(FetchError::Transient { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_immediate() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retrying(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::Malformed {
                    url: "u".into(),
                    reason: "eof".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::Malformed { .. })));
    }
}
