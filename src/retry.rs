//! Caller-level retries for flaky external calls.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::Retryable;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after the first failure; grows linearly with the attempt number
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or runs out
/// of attempts. The last error is returned.
pub fn retry<T, E, F>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let wait = policy.backoff * attempt;
                warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "transient failure, retrying in {:?}",
                    wait
                );
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
