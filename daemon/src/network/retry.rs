//! Exponential backoff for transient transport failures.

use std::future::Future;
use std::time::Duration;

use log::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(5),
            multiplier: 1.6,
            max_backoff: Duration::from_secs(120),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given 1-based retry attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let backoff = self.initial_backoff.mul_f64(factor);
        backoff.min(self.max_backoff)
    }
}

/// Runs `operation` until it succeeds or the attempts are exhausted,
/// sleeping the policy's backoff in between. Returns the last error.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                debug!(
                    "attempt {} failed ({}), retrying in {:?}",
                    attempt, error, backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
