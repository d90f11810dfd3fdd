//! SQL parser wrapper pinned to the Snowflake dialect

use crate::error::{SqlError, SqlResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::Parser;

/// Thin wrapper around sqlparser with the engine's target dialect.
#[derive(Debug, Default)]
pub struct SqlParser {
    dialect: SnowflakeDialect,
}

impl SqlParser {
    /// Create a new Snowflake-dialect parser
    pub fn snowflake() -> Self {
        Self {
            dialect: SnowflakeDialect {},
        }
    }

    /// Parse SQL into AST statements
    pub fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SqlError::EmptySql);
        }
        Ok(Parser::parse_sql(&self.dialect, sql)?)
    }

    /// Parse SQL and return the first statement
    pub fn parse_single(&self, sql: &str) -> SqlResult<Statement> {
        let stmts = self.parse(sql)?;
        stmts.into_iter().next().ok_or(SqlError::EmptySql)
    }
}
