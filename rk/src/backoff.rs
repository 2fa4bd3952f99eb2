//! Retry with exponential backoff and jitter

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Backoff tuning for retry loops and reconnect scheduling
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Ceiling applied to every computed delay
    pub max_delay: Duration,

    /// Multiplier applied per attempt
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Compute the delay before retry `attempt` (0-based)
    ///
    /// `min(base * factor^attempt + jitter, max)` where jitter is uniform
    /// in `[0, base / 2]`. Jitter is added before the cap, so the result
    /// never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_millis() as f64 * self.factor.powi(attempt as i32);
        let jitter = rand::rng().random_range(0.0..=self.base_delay.as_millis() as f64 * 0.5);
        let capped = (raw + jitter).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another retry is allowed after `attempt` failures
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Invoke `op` until it succeeds, retries are exhausted, or `should_retry`
/// bails out
///
/// `op` is invoked at most `max_retries + 1` times. `should_retry` receives
/// the error and the 0-based number of the attempt that just failed;
/// returning false rethrows immediately (for non-retryable errors).
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &BackoffPolicy,
    mut should_retry: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E, u32) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "retry_with_backoff: succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !policy.allows_retry(attempt) || !should_retry(&err, attempt) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retry_with_backoff: retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
