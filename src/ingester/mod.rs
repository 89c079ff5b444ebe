//! Ingestion engine shared by every data source
//!
//! A source only knows how to fetch a raw payload and turn it into an
//! [`IngestionRecord`]. Everything around that (rate limiting, retries,
//! provenance, failure streaks and alerts) lives in [`Ingester`].

pub mod engine;
pub mod error_tracker;
pub mod http;
pub mod rate_limit;
pub mod retry;


use crate::error::{FabricError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use engine::{Ingester, IngesterStats};
pub use error_tracker::{ErrorState, ErrorTracker};
pub use http::HttpJsonSource;
pub use rate_limit::RateLimiter;
pub use retry::{execute_with_retry, execute_with_retry_if, RetryError, RetryPolicy};

/// A normalized record, ready to be stamped and stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionRecord {
    /// Source-specific fields
    pub fields: Map<String, Value>,
    /// Explicit id for an idempotent upsert; `None` lets the store allocate one
    pub document_id: Option<String>,
}

impl IngestionRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            document_id: None,
        }
    }

    pub fn with_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// Where an ingester is within its current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    Idle,
    Fetching,
    Normalizing,
    Storing,
    Failed,
}

/// One external data source
#[async_trait]
pub trait Source: Send + Sync {
    /// Source name
    fn name(&self) -> &str;

    /// Pull one raw payload from the source
    async fn fetch(&self) -> Result<Value>;

    /// Turn a raw payload into a storable record
    fn normalize(&self, raw: Value) -> Result<IngestionRecord>;

    /// Retry fetch/normalize failures with the ingester's retry policy
    fn retry_fetch(&self) -> bool {
        false
    }

    /// Narrow which fetch/normalize errors are worth retrying
    fn is_retryable(&self, _error: &FabricError) -> bool {
        true
    }
}
