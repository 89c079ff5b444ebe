//! Sliding-window rate limiter
//!
//! Keeps the timestamps of accepted requests for one source and suspends the
//! caller until the oldest relevant request leaves the trailing window.

use crate::error::{FabricError, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Per-source request window
///
/// The window lock is held across the wait, so concurrent callers sharing one
/// limiter queue up behind it instead of racing on stale counts.
#[derive(Debug)]
pub struct RateLimiter {
    source_name: String,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until one more request fits into `max_requests` per `window`
    pub async fn allow(&self, max_requests: u32, window: Duration) -> Result<()> {
        if max_requests == 0 {
            return Err(FabricError::RateLimitMisuse(format!(
                "{}: max_requests must be greater than 0",
                self.source_name
            )));
        }
        if window.is_zero() {
            return Err(FabricError::RateLimitMisuse(format!(
                "{}: window must be longer than 0s",
                self.source_name
            )));
        }

        let mut timestamps = self.window.lock().await;
        let now = Instant::now();
        prune(&mut timestamps, now, window);

        let limit = max_requests as usize;
        if timestamps.len() >= limit {
            // the request that has to age out before this one may proceed
            let blocking = timestamps[timestamps.len() - limit];
            let sleep_time = window.saturating_sub(now.duration_since(blocking));
            if !sleep_time.is_zero() {
                warn!(
                    source = %self.source_name,
                    sleep_time = sleep_time.as_secs_f64(),
                    "Rate limit reached. Sleeping for {:.2}s",
                    sleep_time.as_secs_f64()
                );
                sleep(sleep_time).await;
            }
        }

        timestamps.push_back(Instant::now());
        debug!(
            source = %self.source_name,
            in_window = timestamps.len(),
            "Request admitted"
        );
        Ok(())
    }

    /// Number of requests still inside `window`
    pub async fn in_window(&self, window: Duration) -> usize {
        let mut timestamps = self.window.lock().await;
        prune(&mut timestamps, Instant::now(), window);
        timestamps.len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.duration_since(*oldest) < window {
            break;
        }
        timestamps.pop_front();
    }
}
