//! Shared retry policy for outbound requests
//!
//! Exponential backoff with a fixed attempt budget. Only errors that report
//! themselves as transient are retried.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// e.g. 2.0 doubles the delay after every attempt
    pub backoff_multiplier: f64,
    /// Upper bound of the random delay added to each backoff
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_ms: 250,
        }
    }
}

/// Errors that can tell the retry loop whether another attempt makes sense
pub trait RetryableError: std::fmt::Display {
    fn is_transient(&self) -> bool;

    /// Server-provided hint (e.g. `Retry-After`)
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryPolicy {
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Backoff before attempt `attempt + 1`, `attempt` starting at 1
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let exponential = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if exponential.is_finite() {
            (exponential as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };

        let jitter = if self.jitter_ms > 0 {
            fastrand::u64(0..=self.jitter_ms)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Run `op` until it succeeds, fails permanently or the attempt budget is spent.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_async<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && policy.should_retry(attempt) => {
                let mut delay = policy.delay_for(attempt);
                if let Some(hint) = err.retry_after() {
                    delay = delay.max(hint.min(policy.max_delay()));
                }

                warn!(
                    "⚠️ {} failed (attempt {}/{}), retrying in {:?}: {}",
                    label, attempt, policy.max_attempts, delay, err
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
