//! In-process document store
//!
//! Used for dry runs and tests. `_ingested_at` is strictly increasing per store.

use super::{Document, DocumentStore, INGESTED_AT_FIELD};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Collections {
    documents: HashMap<String, HashMap<String, Document>>,
    last_ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents of a collection, keyed by id
    pub fn documents(&self, collection: &str) -> HashMap<String, Document> {
        self.inner
            .read()
            .documents
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(
        &self,
        collection: &str,
        document_id: Option<&str>,
        mut data: Document,
    ) -> Result<String> {
        let mut inner = self.inner.write();

        let now = Utc::now();
        let ingested_at = match inner.last_ingested_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        inner.last_ingested_at = Some(ingested_at);
        data.insert(
            INGESTED_AT_FIELD.to_string(),
            Value::String(ingested_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );

        let id = match document_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        inner
            .documents
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);

        Ok(id)
    }

    async fn get(&self, collection: &str, document_id: &str) -> Result<Option<Document>> {
        Ok(self
            .inner
            .read()
            .documents
            .get(collection)
            .and_then(|docs| docs.get(document_id))
            .cloned())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .inner
            .read()
            .documents
            .get(collection)
            .map_or(0, |docs| docs.len()))
    }

    fn backend(&self) -> &str {
        "memory"
    }
}
