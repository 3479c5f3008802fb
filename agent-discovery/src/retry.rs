//! Delay and bounded exponential-backoff retry

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Suspend the current task for `duration`; zero returns immediately
pub async fn delay(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Backoff before the retry following failed attempt `attempt_index` (0-based)
pub fn backoff(base_delay: Duration, attempt_index: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
    base_delay.saturating_mul(factor)
}

/// Run `operation` up to `max_attempts` times
///
/// After failed attempt `i` (0-based), sleeps `base_delay * 2^i` before the
/// next one. Returns the last error once attempts are exhausted. Every
/// failure is logged. `max_attempts` of 0 is treated as 1.
pub async fn retry<T, E, F, Fut>(operation: F, max_attempts: u32, base_delay: Duration) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_when(operation, max_attempts, base_delay, |_| true).await
}

/// Like [`retry`], but an error for which `is_retryable` is false is
/// returned immediately
pub async fn retry_when<T, E, F, Fut, P>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if !is_retryable(&e) {
                    debug!(attempt, error = %e, "Attempt failed, not retryable");
                    return Err(e);
                }
                if attempt >= max_attempts {
                    warn!(attempt, max_attempts, error = %e, "Attempt failed, giving up");
                    return Err(e);
                }

                let wait = backoff(base_delay, attempt - 1);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                delay(wait).await;
            }
        }
    }
}

/// Retry tuning, as read from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Run `operation` under this policy
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        retry(operation, self.max_attempts, self.base_delay()).await
    }

    /// Run `operation` under this policy, retrying only errors accepted by
    /// `is_retryable`
    pub async fn run_when<T, E, F, Fut, P>(&self, operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        retry_when(operation, self.max_attempts, self.base_delay(), is_retryable).await
    }
}
