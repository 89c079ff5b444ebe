//! SQLite-backed document store
//!
//! Documents are kept as JSON text keyed by (collection, id). The database
//! clock assigns `_ingested_at`.

use super::{Document, DocumentStore};
use crate::error::{FabricError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use uuid::Uuid;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to SQLite database (creates if not exists)
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Private in-memory database (single connection, gone on drop)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert(
        &self,
        collection: &str,
        document_id: Option<&str>,
        data: Document,
    ) -> Result<String> {
        let id = match document_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        let body = serde_json::to_string(&data)?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, ingested_at)
            VALUES (
                ?1,
                ?2,
                json_set(?3, '$._ingested_at', strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            )
            ON CONFLICT (collection, id) DO UPDATE SET
                data = excluded.data,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, collection: &str, document_id: &str) -> Result<Option<Document>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|data| serde_json::from_str::<Document>(&data).map_err(FabricError::from))
            .transpose()
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    fn backend(&self) -> &str {
        "sqlite"
    }
}
