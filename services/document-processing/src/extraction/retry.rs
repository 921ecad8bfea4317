//! Bounded retry with exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use covenant_utils::{CovenantResult, ExtractionConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_backoff.mul_f64(factor)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> CovenantResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CovenantResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_after(attempt);
                    tracing::warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
