use crate::error::AnalysisError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Clone)]
pub enum RetryStrategy {
    None,
    Linear { max_attempts: u32, delay_ms: u64 },
    Exponential { max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64 },
}

/// Retry executor for recoverable operations (model download, startup probes)
pub struct RetryExecutor {
    strategy: RetryStrategy,
}

impl RetryExecutor {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self { strategy }
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match &self.strategy {
            RetryStrategy::None => operation().await,
            RetryStrategy::Linear { max_attempts, delay_ms } => {
                self.execute_with_delays(operation, *max_attempts, *delay_ms, *delay_ms).await
            }
            RetryStrategy::Exponential { max_attempts, base_delay_ms, max_delay_ms } => {
                self.execute_with_delays(operation, *max_attempts, *base_delay_ms, *max_delay_ms)
                    .await
            }
        }
    }

    async fn execute_with_delays<F, Fut, T>(
        &self,
        operation: F,
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let exponential = matches!(self.strategy, RetryStrategy::Exponential { .. });
        let mut delay = base_delay_ms;

        for attempt in 1..=max_attempts {
            debug!("Attempt {} of {}", attempt, max_attempts);

            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_recoverable() || attempt == max_attempts {
                        return Err(err);
                    }

                    warn!("Attempt {} failed: {}, retrying in {}ms", attempt, err, delay);
                    sleep(Duration::from_millis(delay)).await;

                    if exponential {
                        delay = std::cmp::min(delay * 2, max_delay_ms);
                    }
                }
            }
        }

        unreachable!("retry loop returns on the final attempt")
    }
}

/// Convenience wrapper for the common exponential pattern
pub async fn retry_with_exponential_backoff<F, Fut, T>(
    operation: F,
    max_attempts: u32,
    base_delay_ms: u64,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let executor = RetryExecutor::new(RetryStrategy::Exponential {
        max_attempts,
        base_delay_ms,
        max_delay_ms: base_delay_ms * 16, // Cap at 16x base delay
    });

    executor.execute(operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_exponential_backoff(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(AnalysisError::BackendUnavailable("transient".to_string()))
                } else {
                    Ok(n)
                }
            },
            5,
            1,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unrecoverable_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = retry_with_exponential_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(AnalysisError::InvalidInput("no image".to_string()))
            },
            5,
            1,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = RetryExecutor::new(RetryStrategy::Linear {
            max_attempts: 3,
            delay_ms: 1,
        })
        .execute(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(AnalysisError::BackendError("still down".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
