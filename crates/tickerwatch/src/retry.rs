//! Retry logic for outbound calls
//!
//! Publishing has to survive the platform's transient failures and rate
//! limits, so publish calls run through a `RetryPolicy`.

use crate::error::{Result, WatchError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (1.0 keeps a fixed delay)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Same delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, delay, 1.0)
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Calculate backoff duration for a given attempt
    fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// Execute an async operation with retry logic
    ///
    /// Non-retryable errors return immediately. A rate-limit error waits for
    /// the interval the server asked for instead of the computed backoff.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            debug!(
                "Attempt {}/{} for operation: {}",
                attempt + 1,
                self.max_attempts,
                operation_name
            );

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(
                            "Operation '{}' succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.is_retryable() {
                        debug!("Operation '{}' failed with non-retryable error", operation_name);
                        return Err(e);
                    }

                    let wait = match &e {
                        WatchError::RateLimited { retry_after, .. } => *retry_after,
                        _ => self.backoff_duration(attempt + 1),
                    };
                    last_error = Some(e);

                    if attempt + 1 < self.max_attempts {
                        warn!(
                            "Operation '{}' failed (attempt {}/{}): {:?}. Retrying in {:?}",
                            operation_name,
                            attempt + 1,
                            self.max_attempts,
                            last_error,
                            wait
                        );
                        sleep(wait).await;
                    }
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| WatchError::Other("Retry failed with no error".to_string()));

        warn!(
            "Operation '{}' failed after {} attempts: {:?}",
            operation_name, self.max_attempts, error
        );

        Err(error)
    }
}
