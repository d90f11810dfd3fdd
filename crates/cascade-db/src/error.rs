//! Error types for cascade-db

use thiserror::Error;

/// Classification every driver error maps into; drives the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Worth retrying the same logical call (throttling, internal errors)
    Transient,
    /// The connection is gone; discard it and reconnect
    ConnectionLost,
    /// Retrying will not help (SQL errors, permissions, bad requests)
    Permanent,
}

/// Warehouse access errors
#[derive(Error, Debug)]
pub enum DbError {
    /// D001: Failed to establish a connection
    #[error("[D001] Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// D002: A driver call failed, carrying the driver's classification
    #[error("[D002] Driver error ({kind:?}): {message}")]
    Driver { kind: DbErrorKind, message: String },

    /// D003: Query exceeded its time budget
    #[error("[D003] Query timed out after {seconds}s")]
    QueryTimeout { seconds: u64 },

    /// D004: No connection became available within the acquire timeout
    #[error("[D004] Connection pool exhausted: no connection within {waited_ms}ms")]
    AcquireTimeout { waited_ms: u128 },

    /// D005: Feature not implemented by this backend
    #[error("[D005] Not implemented for {backend}: {feature}")]
    NotImplemented {
        backend: &'static str,
        feature: &'static str,
    },

    /// D006: The pool has been closed
    #[error("[D006] Connection pool is closed")]
    PoolClosed,
}

impl DbError {
    /// Shorthand for a driver-classified transient failure
    pub fn transient(message: impl Into<String>) -> Self {
        DbError::Driver {
            kind: DbErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Shorthand for a lost-connection failure
    pub fn connection_lost(message: impl Into<String>) -> Self {
        DbError::Driver {
            kind: DbErrorKind::ConnectionLost,
            message: message.into(),
        }
    }

    /// Shorthand for a permanent failure
    pub fn permanent(message: impl Into<String>) -> Self {
        DbError::Driver {
            kind: DbErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// The retry classification of this error.
    pub fn kind(&self) -> DbErrorKind {
        match self {
            DbError::Driver { kind, .. } => *kind,
            DbError::QueryTimeout { .. } => DbErrorKind::Transient,
            DbError::ConnectionFailed { .. } => DbErrorKind::ConnectionLost,
            DbError::AcquireTimeout { .. } | DbError::NotImplemented { .. } | DbError::PoolClosed => {
                DbErrorKind::Permanent
            }
        }
    }
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;
