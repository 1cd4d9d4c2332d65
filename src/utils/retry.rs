//! Retry utilities for unreliable sources
//!
//! Fetch attempts are retried a bounded number of times with a delay between
//! failures. The default is a fixed one-minute backoff; a multiplier above 1.0
//! turns it into exponential backoff capped at `max_delay_ms`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay in milliseconds before the second attempt
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier applied per retry (1.0 = fixed backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 60_000,
            max_delay_ms: 300_000,
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryConfig {
    /// Fixed backoff between a bounded number of attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            max_attempts,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            backoff_multiplier: 1.0,
        }
    }

    /// Retry configuration with no delay between attempts (for testing)
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Delay to wait before attempt number `attempt` (1-based)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt <= 1 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 2) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }
}

/// Execute an operation with retry logic
///
/// The operation receives the 1-based attempt number. Returns the first
/// success, or every error in attempt order once the budget is exhausted.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, Vec<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = config.max_attempts.max(1);
    let mut errors = Vec::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = config.delay_before(attempt);
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis(),
                "Retrying operation after delay"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                warn!(
                    attempt = attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Operation failed"
                );
                errors.push(e);
            }
        }
    }

    Err(errors)
}
