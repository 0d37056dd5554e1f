//! Retry policy and backoff helper
//!
//! Backoff logic lives here as a value object consumed by a generic helper,
//! keeping it out of business logic.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
    DEFAULT_RETRY_MULTIPLIER,
};
use crate::error::{BenchError, BenchResult};

/// Exponential backoff parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Full-jitter delay before the given retry attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let ceiling = ((self.base_delay_ms as f64) * exp).min(self.max_delay_ms as f64) as u64;
        let jittered = rand::rng().random_range(0..=ceiling.max(1));
        Duration::from_millis(jittered)
    }
}

/// Run a fallible operation, retrying transient failures with backoff.
///
/// Non-transient errors and the final transient error propagate unchanged.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> BenchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BenchResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "{label} failed transiently: {err}, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Helper for callers that must convert retry exhaustion into a recorded
/// failure instead of propagating
pub fn exhausted(err: &BenchError, policy: &RetryPolicy) -> String {
    format!(
        "exhausted {} attempts: {err}",
        policy.max_attempts
    )
}
