//! Retrying warehouse client
//!
//! Wraps the pool with the retry policy: transient failures re-run the same
//! logical call after a backoff; connection-level failures discard the
//! connection so the next attempt reconnects. Permanent failures surface
//! immediately.

use crate::error::{DbError, DbErrorKind, DbResult};
use crate::pool::DriverPool;
use crate::retry::RetryPolicy;
use serde_json::Value;
use std::sync::Arc;

/// Shared handle for executing SQL with retry semantics
#[derive(Clone)]
pub struct WarehouseClient {
    pool: Arc<DriverPool>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for WarehouseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl WarehouseClient {
    pub fn new(pool: Arc<DriverPool>, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Arc<DriverPool> {
        &self.pool
    }

    /// Attempts the policy allows per logical call.
    pub fn retry_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Execute one statement, retrying per policy.
    pub async fn execute(&self, sql: &str) -> DbResult<crate::traits::QueryOutput> {
        let mut attempt: u32 = 0;
        loop {
            let mut conn = self.pool.acquire().await?;
            match conn.execute(sql).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    attempt = self.handle_failure(conn, e, attempt).await?;
                }
            }
        }
    }

    /// Execute a batch of statements in one round trip, retrying per policy.
    pub async fn execute_many(&self, statements: &[String]) -> DbResult<()> {
        let mut attempt: u32 = 0;
        loop {
            let mut conn = self.pool.acquire().await?;
            match conn.execute_many(statements).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt = self.handle_failure(conn, e, attempt).await?;
                }
            }
        }
    }

    /// Bulk-load rows through the driver's native path, retrying per policy.
    pub async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> DbResult<usize> {
        let mut attempt: u32 = 0;
        loop {
            let mut conn = self.pool.acquire().await?;
            match conn.bulk_insert(table, columns, rows.clone()).await {
                Ok(count) => return Ok(count),
                Err(e) => {
                    attempt = self.handle_failure(conn, e, attempt).await?;
                }
            }
        }
    }

    /// Execute and return the first cell of the first row.
    pub async fn query_scalar(&self, sql: &str) -> DbResult<Option<Value>> {
        let output = self.execute(sql).await?;
        Ok(output.scalar().cloned())
    }

    /// Classify a failure: sleep-and-continue for retryable errors (returning
    /// the incremented attempt counter), or propagate.
    async fn handle_failure(
        &self,
        conn: crate::pool::PooledConnection,
        error: DbError,
        attempt: u32,
    ) -> DbResult<u32> {
        match error.kind() {
            DbErrorKind::Transient if self.retry.should_retry(attempt) => {
                let delay = self.retry.delay(attempt);
                log::warn!(
                    "transient warehouse error (attempt {}): {}; retrying in {:?}",
                    attempt + 1,
                    error,
                    delay
                );
                drop(conn);
                tokio::time::sleep(delay).await;
                Ok(attempt + 1)
            }
            DbErrorKind::ConnectionLost if self.retry.should_retry(attempt) => {
                let delay = self.retry.delay(attempt);
                log::warn!(
                    "connection lost (attempt {}): {}; reconnecting in {:?}",
                    attempt + 1,
                    error,
                    delay
                );
                conn.discard();
                tokio::time::sleep(delay).await;
                Ok(attempt + 1)
            }
            DbErrorKind::ConnectionLost => {
                conn.discard();
                Err(error)
            }
            _ => Err(error),
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
