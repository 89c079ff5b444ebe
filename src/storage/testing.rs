//! Store doubles for tests

use super::{Document, DocumentStore, MemoryStore};
use crate::error::{FabricError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

/// Fails the first `failures` upserts, then delegates to a [`MemoryStore`]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyStore {
    pub fn failing(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    pub fn upsert_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn upsert(
        &self,
        collection: &str,
        document_id: Option<&str>,
        data: Document,
    ) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(FabricError::Store(format!("unavailable (call {})", call)));
        }
        self.inner.upsert(collection, document_id, data).await
    }

    async fn get(&self, collection: &str, document_id: &str) -> Result<Option<Document>> {
        self.inner.get(collection, document_id).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }

    fn backend(&self) -> &str {
        "flaky"
    }
}
