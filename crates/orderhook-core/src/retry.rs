//! Retry with exponential backoff for transient failures.
//!
//! Used by the partner client around every outbound call and by the
//! dispatcher around order persistence. Only errors that report themselves
//! as transient are retried; anything else is returned on the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Classifies an error as worth retrying or not.
pub trait IsTransient {
    /// Returns `true` if repeating the operation may succeed.
    fn is_transient(&self) -> bool;
}

/// Backoff parameters for a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed (0.0 disables jitter).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping. Intended for tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Returns a copy with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after `failed_attempts` attempts have failed.
    #[must_use]
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = i32::try_from(failed_attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 && capped > 0.0 {
            let range = capped * self.jitter;
            capped + rand::rng().random_range(-range..=range)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Runs `op` until it succeeds, fails permanently, or the attempt budget is
/// spent. The closure receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the first non-transient error, or the last transient error once
/// `policy.max_attempts` attempts have failed.
pub async fn retry_transient<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + IsTransient,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::debug!(operation, attempt, error = %error, "permanent failure, not retrying");
                return Err(error);
            }
            Err(error) if attempt >= max_attempts => {
                tracing::error!(operation, attempt, error = %error, "operation failed after all retries");
                return Err(error);
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "transient failure, retrying after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
