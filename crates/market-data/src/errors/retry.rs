//! Retry classification and the backoff wrapper used around network calls.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

/// Default number of attempts (first call included).
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the second attempt.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Factor applied to the delay after every failed attempt.
const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Classification for retry policy.
///
/// | Class | Retried by [`retry_with_backoff`]? |
/// |-------|-----------------------------------|
/// | `Never` | No, fail fast |
/// | `WithBackoff` | Yes, until attempts run out |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad symbol, parse or validation failure.
    /// The same request would produce the same answer.
    Never,

    /// Transient transport failure (timeout, connection reset, 429).
    /// Retry after an exponentially growing delay.
    WithBackoff,
}

/// Parameters of the exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay slept after the first failure.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each subsequent failure.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to sleep after the given failed attempt (1-based).
    ///
    /// With the defaults this yields 1s, 2s, 4s, ...
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.base_delay.saturating_mul(factor)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// `is_retryable` decides which errors earn another attempt. On exhaustion the
/// last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{}: succeeded on attempt {}/{}", label, attempt, attempts);
                }
                return Ok(value);
            }
            Err(err) if attempt < attempts && is_retryable(&err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    label, attempt, attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if is_retryable(&err) {
                    warn!("{}: giving up after {} attempts: {}", label, attempt, err);
                }
                return Err(err);
            }
        }
    }
}
