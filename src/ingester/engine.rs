//! Per-source ingestion cycle
//!
//! rate-limit gate -> fetch -> normalize -> store (retried) -> error tracking -> alert

use super::error_tracker::{ErrorState, ErrorTracker};
use super::rate_limit::RateLimiter;
use super::retry::{execute_with_retry_if, RetryError, RetryPolicy};
use super::{CycleState, IngestionRecord, Source};
use crate::config::IngestionSettings;
use crate::error::{FabricError, Result};
use crate::notify::{Alert, AlertSink};
use crate::storage::{DocumentStore, StorageWriter};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngesterStats {
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub alerts_raised: u64,
    pub last_ingestion_time: Option<DateTime<Utc>>,
}

pub struct Ingester {
    settings: IngestionSettings,
    source: Arc<dyn Source>,
    limiter: RateLimiter,
    fetch_retry: RetryPolicy,
    writer: StorageWriter,
    tracker: ErrorTracker,
    alerts: Arc<dyn AlertSink>,
    state: Mutex<CycleState>,
    stats: Mutex<IngesterStats>,
}

/// Publishes the cycle state; falls back to `Idle` when the cycle ends or is dropped
struct StateGuard<'a> {
    state: &'a Mutex<CycleState>,
}

impl<'a> StateGuard<'a> {
    fn enter(state: &'a Mutex<CycleState>) -> Self {
        *state.lock() = CycleState::Fetching;
        Self { state }
    }

    fn set(&self, next: CycleState) {
        *self.state.lock() = next;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = CycleState::Idle;
    }
}

impl Ingester {
    pub fn new(
        settings: IngestionSettings,
        source: Arc<dyn Source>,
        store: Arc<dyn DocumentStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self> {
        if settings.max_requests_per_window == 0 || settings.rate_limit_window.is_zero() {
            return Err(FabricError::RateLimitMisuse(format!(
                "{}: rate limit needs max_requests_per_window > 0 and a non-zero window",
                settings.source_name
            )));
        }

        if settings.max_errors_before_alert == 0 {
            return Err(FabricError::config(format!(
                "{}: max_errors_before_alert must be greater than 0",
                settings.source_name
            )));
        }
        if settings.interval.is_zero() {
            return Err(FabricError::config(format!(
                "{}: interval must be non-zero",
                settings.source_name
            )));
        }

        let fetch_retry = RetryPolicy::new(settings.max_retries, settings.retry_base_delay)?;
        let writer = StorageWriter::new(store, &settings)?;

        Ok(Self {
            limiter: RateLimiter::new(settings.source_name.clone()),
            tracker: ErrorTracker::new(settings.max_errors_before_alert),
            fetch_retry,
            writer,
            source,
            alerts,
            settings,
            state: Mutex::new(CycleState::Idle),
            stats: Mutex::new(IngesterStats::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.source_name
    }

    pub fn settings(&self) -> &IngestionSettings {
        &self.settings
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock()
    }

    pub fn error_state(&self) -> ErrorState {
        self.tracker.snapshot()
    }

    pub fn stats(&self) -> IngesterStats {
        self.stats.lock().clone()
    }

    /// Run one full cycle and return the stored document id
    ///
    /// Terminal failures are logged and counted before they are returned.
    /// Dropping the future before it resolves records neither outcome.
    pub async fn run_cycle(&self) -> Result<String> {
        let state = StateGuard::enter(&self.state);

        match self.attempt_cycle(&state).await {
            Ok(id) => {
                self.tracker.record_success();
                {
                    let mut stats = self.stats.lock();
                    stats.cycles_succeeded += 1;
                    stats.last_ingestion_time = Some(Utc::now());
                }
                info!(
                    source = %self.settings.source_name,
                    collection = %self.settings.collection,
                    "Ingested document {}",
                    id
                );
                Ok(id)
            }
            Err(e) => {
                state.set(CycleState::Failed);
                let triggered = self.tracker.record_failure(&e);
                self.stats.lock().cycles_failed += 1;
                error!(
                    source = %self.settings.source_name,
                    consecutive_errors = self.tracker.consecutive_errors(),
                    "Ingestion cycle failed: {}",
                    e
                );
                if triggered {
                    self.raise_alert(&e).await;
                }
                Err(e)
            }
        }
    }

    async fn attempt_cycle(&self, state: &StateGuard<'_>) -> Result<String> {
        let record = if self.source.retry_fetch() {
            execute_with_retry_if(
                &self.fetch_retry,
                |e: &FabricError| !e.is_configuration() && self.source.is_retryable(e),
                || self.fetch_record(state),
            )
            .await
            .map_err(RetryError::into_inner)?
        } else {
            self.fetch_record(state).await?
        };

        state.set(CycleState::Storing);
        self.writer
            .store(&record.fields, record.document_id.as_deref())
            .await
    }

    async fn fetch_record(&self, state: &StateGuard<'_>) -> Result<IngestionRecord> {
        state.set(CycleState::Fetching);
        self.limiter
            .allow(
                self.settings.max_requests_per_window,
                self.settings.rate_limit_window,
            )
            .await?;

        let raw = self.source.fetch().await?;
        state.set(CycleState::Normalizing);
        self.source.normalize(raw)
    }

    async fn raise_alert(&self, last_error: &FabricError) {
        let alert = Alert::new(
            &self.settings.source_name,
            self.tracker.consecutive_errors(),
            last_error,
        );
        self.stats.lock().alerts_raised += 1;
        warn!(
            source = %alert.source_name,
            consecutive_errors = alert.consecutive_errors,
            "Error threshold reached, raising alert"
        );

        if let Err(e) = self.alerts.send_alert(&alert).await {
            error!(
                source = %alert.source_name,
                "Failed to deliver alert: {}",
                e
            );
        }
    }

    /// Run cycles on the configured cadence until shutdown
    ///
    /// An in-flight cycle is abandoned when shutdown arrives. Configuration
    /// errors stop the loop; everything else waits for the next tick.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            source = %self.settings.source_name,
            "Starting ingester (every {}s)",
            self.settings.interval.as_secs()
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    warn!(
                        source = %self.settings.source_name,
                        "Shutdown during cycle, abandoning it"
                    );
                    break;
                }
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        if e.is_configuration() {
                            error!(source = %self.settings.source_name, "Stopping ingester: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        info!(source = %self.settings.source_name, stats = ?self.stats(), "Ingester stopped");
    }
}
