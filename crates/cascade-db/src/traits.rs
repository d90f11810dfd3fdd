//! The driver contract
//!
//! Any warehouse backend plugs in here. Implementations must be Send + Sync
//! for use across executor tasks. Error values carry a [`DbErrorKind`]
//! classification so the pool and retry layers can decide what to do
//! without knowing the backend.
//!
//! [`DbErrorKind`]: crate::error::DbErrorKind

use crate::error::DbResult;
use async_trait::async_trait;
use serde_json::Value;

/// Connection parameters handed to `Driver::connect`
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub account: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
}

/// Result of one statement
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    /// Column names, in projection order
    pub columns: Vec<String>,

    /// Row values; cells are JSON values for backend neutrality
    pub rows: Vec<Vec<Value>>,

    /// Rows affected by DML, when the backend reports it
    pub rows_affected: Option<usize>,
}

impl QueryOutput {
    /// Result of a statement that returned nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result with rows affected only
    pub fn affected(rows: usize) -> Self {
        Self {
            rows_affected: Some(rows),
            ..Self::default()
        }
    }

    /// The first cell of the first row, if any
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Factory for connections to one warehouse backend
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a new connection
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn Connection>>;

    /// Backend identifier for logging
    fn backend(&self) -> &'static str;
}

/// A live warehouse connection
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Execute one statement and collect its result
    async fn execute(&mut self, sql: &str) -> DbResult<QueryOutput>;

    /// Execute a batch of statements in a single round trip
    async fn execute_many(&mut self, statements: &[String]) -> DbResult<()>;

    /// Bulk-load rows into a table, returning the row count. Backends should
    /// route this through their native bulk path (e.g. COPY INTO).
    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> DbResult<usize>;

    /// Cached health state. Must not issue a probe query; the pool calls
    /// this on every acquire.
    fn is_healthy(&self) -> bool;

    /// Best-effort cancellation of the in-flight statement
    async fn cancel(&self) -> DbResult<()>;
}
