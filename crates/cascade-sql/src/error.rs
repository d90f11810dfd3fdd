//! Error types for cascade-sql

use thiserror::Error;

/// SQL analysis errors
#[derive(Error, Debug)]
pub enum SqlError {
    /// S001: Empty SQL input
    #[error("[S001] SQL is empty")]
    EmptySql,

    /// S002: SQL failed to parse
    #[error("[S002] SQL parse failed: {0}")]
    ParseFailed(String),
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;

impl From<sqlparser::parser::ParserError> for SqlError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        SqlError::ParseFailed(err.to_string())
    }
}
