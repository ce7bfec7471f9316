//! Database collaborator: executes a statement whose rows are single JSON documents.

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::migration::apply_migrations;
use crate::sql::{bind_all, QueryBuf};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// Capability consumed by attached resources. Implementations own connection handling;
/// every call runs exactly one statement.
#[async_trait]
pub trait Database: Send + Sync {
    /// Runs `query` (already producing one JSON column per row) and returns the documents in order.
    async fn fetch_json_rows(&self, query: &QueryBuf) -> Result<Vec<serde_json::Value>, DatabaseError>;
}

pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, DatabaseError>> + Send + 'c>>;

/// PostgreSQL handle backed by a sqlx pool.
#[derive(Clone, Debug)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Opens a pool and checks connectivity with `SELECT 1`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "database pool ready");
        Ok(PgDatabase { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgDatabase { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs `f` inside a transaction. Commits on `Ok`; any error (or panic) drops the
    /// transaction, which rolls it back.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> TxFuture<'c, T>,
    {
        let mut tx = self.pool.begin().await?;
        let out = f(&mut *tx).await?;
        tx.commit().await?;
        Ok(out)
    }

    /// Applies pending `*.sql` scripts from `dir`. Returns the names applied by this call.
    pub async fn migrate(&self, dir: impl AsRef<Path>) -> Result<Vec<String>, DatabaseError> {
        apply_migrations(&self.pool, dir.as_ref()).await
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn fetch_json_rows(&self, query: &QueryBuf) -> Result<Vec<serde_json::Value>, DatabaseError> {
        tracing::debug!(sql = %query.sql, params = ?query.params, "query");
        let rows = bind_all(sqlx::query_scalar::<_, serde_json::Value>(&query.sql), &query.params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
