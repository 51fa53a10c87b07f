use std::thread;
use std::time::Duration;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Exponential backoff configuration with jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_secs: 13,
            max_delay_secs: 120,
        }
    }
}

impl RetryConfig {
    /// Total attempts allowed, e.g. `3` becomes 1 initial try plus 2 retries.
    pub fn with_attempts(attempts: u32, base_delay_secs: u64, max_delay_secs: u64) -> Self {
        Self {
            max_retries: attempts.saturating_sub(1),
            base_delay_secs,
            max_delay_secs,
        }
    }

    /// Compute the delay for a given retry attempt (0-indexed).
    ///
    /// Formula: `min(base_delay * 2^retry, max_delay) + random_jitter(0..base_delay)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exp_delay = self
            .base_delay_secs
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_delay.min(self.max_delay_secs);
        let jitter = if self.base_delay_secs > 0 {
            rand::thread_rng().gen_range(0..self.base_delay_secs)
        } else {
            0
        };
        Duration::from_secs(capped + jitter)
    }
}

/// Retry a blocking operation with exponential backoff and jitter.
///
/// Returns the first `Ok` result, or the last error if retries are exhausted
/// or the classifier returns `Abort`.
pub fn retry_with_backoff<F, T, E, C>(config: &RetryConfig, classifier: C, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(val) => return Ok(val),
            Err(e) => {
                attempt += 1;
                if classifier(&e) == RetryAction::Abort || attempt >= total_attempts {
                    return Err(e);
                }
                let delay = config.delay_for_retry(attempt - 1);
                log::warn!(
                    "Retryable error (attempt {}/{}), retrying in {}s: {}",
                    attempt,
                    total_attempts,
                    delay.as_secs(),
                    e
                );
                thread::sleep(delay);
            }
        }
    }
}

/// Run `operation` against `state`; when it fails with an error
/// `needs_reauth` accepts, call `reauth` and try again, at most
/// `max_attempts` times in total.
pub fn with_reauth<S, T, E, F, R, P>(
    state: &mut S,
    max_attempts: u32,
    needs_reauth: P,
    mut operation: F,
    mut reauth: R,
) -> Result<T, E>
where
    S: ?Sized,
    F: FnMut(&mut S) -> Result<T, E>,
    R: FnMut(&mut S) -> Result<(), E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match operation(state) {
            Ok(val) => return Ok(val),
            Err(e) if needs_reauth(&e) && attempt < max_attempts => {
                log::info!("Session expired ({}), logging in again ({}/{})", e, attempt, max_attempts - 1);
                reauth(state)?;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
