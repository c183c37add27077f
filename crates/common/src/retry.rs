//! Bounded exponential backoff for transient store failures
//!
//! Only errors for which [`AppError::is_retryable`] holds are retried, and never more than
//! `max_attempts` times in total. Validation errors surface on the first attempt.

use crate::config::RetryConfig;
use crate::errors::{AppError, Result};
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

/// Retry settings resolved from configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt ceiling is hit
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.max_attempts;

        retry(self.backoff(), || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let fut = operation();
            async move {
                fut.await.map_err(|e| {
                    if e.is_retryable() && attempt < max_attempts {
                        warn!(
                            operation = operation_name,
                            attempt,
                            max_attempts,
                            error = %e,
                            "Transient store failure, retrying"
                        );
                        crate::metrics::record_retry(operation_name);
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Count attempts made against a flaky operation (test helper)
    fn flaky(
        calls: &AtomicU32,
        failures: u32,
        error: fn() -> AppError,
    ) -> impl Future<Output = Result<u32>> + '_ {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n <= failures {
                Err(error())
            } else {
                Ok(n)
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    fn unavailable() -> AppError {
        AppError::StoreUnavailable {
            store: "graph".into(),
            message: "connection reset".into(),
        }
    }

    fn invalid() -> AppError {
        AppError::DimensionMismatch {
            expected: 3,
            actual: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("merge_entities", || flaky(&calls, 2, unavailable))
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_attempt_ceiling() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(2)
            .run("upsert", || flaky(&calls, 10, unavailable))
            .await;
        assert!(matches!(result, Err(AppError::StoreUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(5)
            .run("upsert", || flaky(&calls, 10, invalid))
            .await;
        assert!(matches!(result, Err(AppError::DimensionMismatch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_from_config_clamps_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            multiplier: 1.5,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_backoff, Duration::from_millis(10));
    }
}
