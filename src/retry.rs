//! Exponential-backoff retry for the retryable (cluster/transport) error
//! class. Non-retryable errors propagate on the first failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{Result, TrellisError};

/// Backoff parameters. `delay(n) = min(base * factor^n, max_delay)`, with
/// up to 10% random jitter subtracted when `jitter` is set.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Defaults for in-process and point-to-point operations.
    pub fn local() -> Self {
        Self {
            base: Duration::from_millis(100),
            factor: 2,
            max_delay: Duration::from_secs(5),
            max_attempts: 3,
            jitter: true,
        }
    }

    /// Defaults for distributed operations spanning several peers.
    pub fn distributed() -> Self {
        Self {
            base: Duration::from_millis(200),
            factor: 2,
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
            jitter: true,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.base.saturating_mul(self.factor.saturating_pow(exp));
        let capped = raw.min(self.max_delay);
        if self.jitter && !capped.is_zero() {
            let shave = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 10);
            capped - Duration::from_millis(shave)
        } else {
            capped
        }
    }

    /// Runs `op` until it succeeds, fails non-retryably, or exhausts
    /// `max_attempts`. `on_retry(attempt, error)` fires before each delay.
    pub async fn run<T, F, Fut, C>(&self, mut op: F, mut on_retry: C) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: FnMut(u32, &TrellisError),
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "retryable failure, backing off");
                    on_retry(attempt, &err);
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
