// 🔁 Retry/Backoff Controller
//
// Delay before attempt n+1 is base_delay * 2^(n-1), capped at max_delay.
// Only retryable errors are retried; everything else fails on first sight.

use crate::error::{FetchError, RetryError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound (exclusive) of the random jitter added to a delay
pub const JITTER_MS: u64 = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Add up to `JITTER_MS` of random jitter on top of each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
        let base = self
            .base_delay_ms
            .saturating_mul(exponent)
            .min(self.max_delay_ms);
        let jitter = if self.jitter {
            rand::thread_rng().gen_range(0..JITTER_MS)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// `label` identifies the unit of work in logs (e.g. "tcn/Acme").
pub async fn attempt<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.max_attempts.max(1);
    let started = Instant::now();

    for attempt in 1..=attempts {
        match operation(attempt).await {
            Ok(value) => {
                debug!(
                    unit = label,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "unit succeeded"
                );
                return Ok(value);
            }
            Err(error) if !error.is_retryable() => {
                warn!(unit = label, attempt, %error, "permanent failure, not retrying");
                return Err(RetryError::Permanent { attempts: attempt, error });
            }
            Err(error) if attempt == attempts => {
                warn!(
                    unit = label,
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    %error,
                    "retries exhausted"
                );
                return Err(RetryError::Exhausted { attempts, last: error });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    unit = label,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("retry loop always returns on the final attempt")
}
