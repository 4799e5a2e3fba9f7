//! Retry with exponential backoff.

use super::SupplierError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// HTTP statuses worth retrying.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Longest wait between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Seconds; the n-th retry waits `backoff_factor * 2^n`
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_factor: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), capped at two minutes.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor.max(0.0) * 2f64.powi(attempt.min(30) as i32);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error
    /// or exhausts the retries.
    pub async fn run<T, F, Fut>(&self, target: &str, mut operation: F) -> Result<T, SupplierError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SupplierError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        target_url = target,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
