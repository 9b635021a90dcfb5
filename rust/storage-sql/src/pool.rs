use chroma_error::{ChromaError, ErrorCodes};
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::config::RelationalStoreConfig;

/// A pooled connection to the relational backend shared by the catalog and
/// the log store.
///
/// Cloning is cheap: `PgPool` is an `Arc`-backed handle and all clones share
/// the same pool, so no caller ever holds a connection across an external
/// API call by accident -- connections are only checked out for the
/// duration of a single query or transaction.
#[derive(Clone, Debug)]
pub struct RelationalStore {
    pool: PgPool,
}

#[derive(Debug, Error)]
pub enum RelationalStoreError {
    #[error("failed to connect to relational store: {0}")]
    Connect(#[from] sqlx::Error),
}

impl ChromaError for RelationalStoreError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Unavailable
    }
}

impl RelationalStore {
    pub async fn connect(config: &RelationalStoreConfig) -> Result<Self, RelationalStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_open_conns)
            .min_connections(config.max_idle_conns.min(config.max_open_conns))
            .connect(&config.connection_string())
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs a batch of idempotent DDL statements (`CREATE TABLE IF NOT
    /// EXISTS ...`) against the pool. Callers own their own schema; this is
    /// just a thin helper so each backend doesn't hand-roll transaction
    /// bookkeeping for startup schema creation.
    pub async fn apply_schema(&self, statements: &[&str]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await
    }
}
