//! Document persistence
//!
//! [`DocumentStore`] is the narrow contract the engine needs from a backend;
//! [`StorageWriter`] stamps provenance onto records and writes them through
//! the retry policy.

pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;


use crate::config::IngestionSettings;
use crate::error::{FabricError, Result};
use crate::ingester::retry::{execute_with_retry, RetryPolicy};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Name of the source that produced the document
pub const SOURCE_FIELD: &str = "_source";
/// Assigned by the store when the write lands
pub const INGESTED_AT_FIELD: &str = "_ingested_at";
/// Client clock at write time (RFC 3339, UTC)
pub const PROCESSED_AT_FIELD: &str = "_processed_at";

/// A stored document: field name -> JSON value
pub type Document = Map<String, Value>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replace-or-create at `document_id`, or create under a fresh id when none is given.
    ///
    /// The store sets [`INGESTED_AT_FIELD`] itself; returns the document id.
    async fn upsert(
        &self,
        collection: &str,
        document_id: Option<&str>,
        data: Document,
    ) -> Result<String>;

    async fn get(&self, collection: &str, document_id: &str) -> Result<Option<Document>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Backend name for logs
    fn backend(&self) -> &str;
}

/// Writes one source's records into its collection
pub struct StorageWriter {
    store: Arc<dyn DocumentStore>,
    source_name: String,
    collection: String,
    retry: RetryPolicy,
}

impl StorageWriter {
    pub fn new(store: Arc<dyn DocumentStore>, settings: &IngestionSettings) -> Result<Self> {
        let retry = RetryPolicy::new(settings.max_retries, settings.retry_base_delay)?;
        Ok(Self::with_retry(
            store,
            &settings.source_name,
            &settings.collection,
            retry,
        ))
    }

    pub fn with_retry(
        store: Arc<dyn DocumentStore>,
        source_name: &str,
        collection: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            source_name: source_name.to_string(),
            collection: collection.to_string(),
            retry,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Copy `fields` and inject provenance; caller values for those names are dropped
    pub fn stamp(&self, fields: &Document) -> Document {
        let mut document = fields.clone();
        document.remove(INGESTED_AT_FIELD);
        document.insert(
            SOURCE_FIELD.to_string(),
            Value::String(self.source_name.clone()),
        );
        document.insert(
            PROCESSED_AT_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        document
    }

    /// Persist `fields`, returning the document id
    ///
    /// With a `document_id` the write is an idempotent upsert; without one every
    /// call creates a new document.
    pub async fn store(&self, fields: &Document, document_id: Option<&str>) -> Result<String> {
        let written = execute_with_retry(&self.retry, || {
            let document = self.stamp(fields);
            async move {
                self.store
                    .upsert(&self.collection, document_id, document)
                    .await
            }
        })
        .await;

        match written {
            Ok(id) => {
                debug!(
                    source = %self.source_name,
                    collection = %self.collection,
                    backend = self.store.backend(),
                    "Stored document {}",
                    id
                );
                Ok(id)
            }
            Err(e) => {
                error!(
                    source = %self.source_name,
                    collection = %self.collection,
                    attempts = e.attempts,
                    "Failed to store document: {}",
                    e.last_error
                );
                Err(FabricError::Storage {
                    attempts: e.attempts,
                    source: Box::new(e.last_error),
                })
            }
        }
    }
}
