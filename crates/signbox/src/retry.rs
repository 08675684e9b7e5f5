use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::Result;

/// Upper bound on a single computed backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry-with-backoff policy shared by all SignBox clients.
///
/// Parameterized by attempt count and delay so each client applies the same
/// behavior instead of duplicating loops per call site. Only errors whose
/// [`SignBoxError::is_retryable`](crate::SignBoxError::is_retryable) is true
/// are re-attempted; everything else short-circuits immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure. 0 disables retries.
    pub max_extra_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplicative backoff factor per retry.
    pub multiplier: f64,
    /// Add random jitter (up to 25% of the computed delay) to avoid
    /// synchronized retries across sessions.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_extra_attempts: 2,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_extra_attempts: 0,
            ..Self::default()
        }
    }

    /// Deterministic policy with no sleep between attempts, for tests.
    pub fn immediate(max_extra_attempts: u32) -> Self {
        Self {
            max_extra_attempts,
            base_delay: Duration::ZERO,
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Backoff delay before retry number `retry` (0-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(retry as i32);
        let capped = base_ms.min(MAX_DELAY.as_millis() as f64);
        let mut delay_ms = capped as u64;

        if self.jitter && delay_ms > 0 {
            let spread = delay_ms / 4;
            if spread > 0 {
                delay_ms += rand::thread_rng().gen_range(0..=spread);
            }
        }

        Duration::from_millis(delay_ms.min(MAX_DELAY.as_millis() as u64))
    }

    /// Run `op`, retrying transient failures with exponential backoff.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retry < self.max_extra_attempts => {
                    let delay = self.delay_for(retry);
                    retry += 1;
                    warn!(
                        retry,
                        max = self.max_extra_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying: {}",
                        err
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
