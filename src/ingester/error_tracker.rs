//! Consecutive failure tracking with edge-triggered alerts

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Snapshot of one ingester's failure streak
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorState {
    pub consecutive_errors: u32,
    pub max_before_alert: u32,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct ErrorTracker {
    state: Mutex<ErrorState>,
}

impl ErrorTracker {
    pub fn new(max_before_alert: u32) -> Self {
        Self {
            state: Mutex::new(ErrorState {
                consecutive_errors: 0,
                max_before_alert,
                last_error_at: None,
                last_error: None,
            }),
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_errors = 0;
    }

    /// Count a failure; true only on the call that reaches the threshold
    pub fn record_failure(&self, error: &dyn std::fmt::Display) -> bool {
        let mut state = self.state.lock();
        state.consecutive_errors = state.consecutive_errors.saturating_add(1);
        state.last_error_at = Some(Utc::now());
        state.last_error = Some(error.to_string());
        state.consecutive_errors == state.max_before_alert
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.state.lock().consecutive_errors
    }

    pub fn snapshot(&self) -> ErrorState {
        self.state.lock().clone()
    }
}
