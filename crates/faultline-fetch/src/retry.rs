use std::future::Future;
use std::time::Duration;

use faultline_config::FetchConfig;
use tokio::time::sleep;

use crate::FetchError;

/// Bounded exponential backoff for remote calls. Only
/// [`FetchError::Transient`] is retried; everything else returns at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
        }
    }

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let shifted = 1u64
            .checked_shl(attempt)
            .and_then(|factor| self.backoff_base_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        Duration::from_millis(shifted.min(self.backoff_max_ms))
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let total_attempts = self.max_retries + 1;
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < total_attempts => {
                    let backoff = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        total_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base_ms: 1,
            backoff_max_ms: 4,
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 2_000,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(9), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(80), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let value = fast_policy(3)
            .run("flaky", || async {
                let seen = calls.fetch_add(1, Ordering::SeqCst);
                if seen < 2 {
                    Err(FetchError::Transient("reset".to_owned()))
                } else {
                    Ok(seen)
                }
            })
            .await
            .expect("eventually succeeds");
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let err = fast_policy(2)
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::Transient("503".to_owned()))
            })
            .await
            .expect_err("never succeeds");
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast_policy(5)
            .run("gone", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::RepositoryUnavailable("404".to_owned()))
            })
            .await
            .expect_err("unavailable");
        assert!(err.is_repository_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
