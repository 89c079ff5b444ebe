//! Bounded retries with exponential backoff and full jitter

use crate::error::{FabricError, Result};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Overflow guard for the backoff exponent (base * 2^16 at most)
const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_tries: u32,
    base_delay: Duration,
}

/// The final error of an exhausted (or non-retryable) operation
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        self.last_error
    }
}

impl RetryPolicy {
    pub fn new(max_tries: u32, base_delay: Duration) -> Result<Self> {
        if max_tries == 0 {
            return Err(FabricError::config("max_tries must be at least 1"));
        }
        Ok(Self {
            max_tries,
            base_delay,
        })
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper bound of the wait after failed attempt `attempt` (1-based)
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// Full jitter: uniform in `[0, backoff_ceiling(attempt)]`
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        let factor: f64 = rand::rng().random_range(0.0..=1.0);
        ceiling.mul_f64(factor)
    }
}

/// Run `operation` until it succeeds or `policy.max_tries()` attempts failed
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: F,
) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    execute_with_retry_if(policy, |_| true, operation).await
}

/// Like [`execute_with_retry`], but gives up at once on errors `should_retry` rejects
pub async fn execute_with_retry_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= policy.max_tries || !should_retry(&e) {
                    return Err(RetryError {
                        attempts: attempt,
                        last_error: e,
                    });
                }

                let delay = policy.jittered_delay(attempt);
                warn!(
                    attempt,
                    max_tries = policy.max_tries,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt {}/{} failed: {}",
                    attempt,
                    policy.max_tries,
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
