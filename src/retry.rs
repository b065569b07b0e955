//! # Bounded Retry
//!
//! Fixed-delay retry with an attempt budget. The operation receives the
//! 1-based attempt number. Errors the caller marks as permanent end the loop
//! immediately; after the budget is spent the last error is returned.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// Attempt budget and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` of zero is treated as one attempt
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no retry
    #[must_use]
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Run `operation` until it succeeds, fails permanently, or the budget is spent.
///
/// # Errors
///
/// Returns the error of the last attempt made.
pub async fn retry<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_permanent: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) if is_permanent(&e) => {
                error!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed with a permanent error, not retrying"
                );
                return Err(e);
            }
            Err(e) if attempt >= policy.max_attempts => {
                error!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed after max attempts"
                );
                return Err(e);
            }
            Err(_) => {
                debug!(
                    operation = %operation_name,
                    attempt = attempt,
                    delay_ms = policy.delay.as_millis(),
                    "Retrying operation"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
