//! Retry policy with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::domain::errors::CoreResult;

/// Retry policy for transient failures.
///
/// Backoff grows geometrically from `initial_backoff` by `multiplier` per
/// attempt, with a symmetric random jitter fraction applied to each delay.
/// Only [`CoreError::Unavailable`] is retried; every other error kind is
/// returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, multiplier: f64, jitter: f64) -> Self {
        Self { max_attempts, initial_backoff, multiplier, jitter }
    }

    /// Execute `operation`, retrying transient failures until the attempt
    /// budget runs out.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt >= self.max_attempts {
                        return Err(err);
                    }

                    let backoff = self.backoff_for(attempt - 1);
                    tracing::debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    /// Delay before the retry following `attempt` (0-indexed) failures.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let jittered = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            base * (1.0 + factor)
        } else {
            base
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}
