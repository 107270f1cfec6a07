//! Key-value store adapter.
//!
//! The cache and the recent-history list both persist through [`KvStore`],
//! each under its own key prefix. Every write is a single-key overwrite, so
//! the adapter needs no transactions.

use std::future::Future;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::models::KvEntry;
use super::queries;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Persistent, string-keyed key-value store.
pub trait KvStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All entries in a key namespace, ordered by key.
    fn entries_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<KvEntry>, StoreError>> + Send;
}

/// Maximum number of connections in the SQLite pool.
const STORE_POOL_MAX_CONNECTIONS: u32 = 5;

/// [`KvStore`] backed by a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(STORE_POOL_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        tracing::info!("Key-value store ready at {}", url);

        Ok(Self { pool })
    }

    /// Private in-memory database. A single pinned connection keeps the data
    /// alive for the lifetime of the pool.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(queries::get_value(&self.pool, key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(queries::upsert_value(&self.pool, key, value).await?)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        Ok(queries::delete_value(&self.pool, key).await?)
    }

    async fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>, StoreError> {
        Ok(queries::list_entries_with_prefix(&self.pool, prefix).await?)
    }
}
