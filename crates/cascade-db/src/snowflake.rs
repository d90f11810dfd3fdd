//! Snowflake driver seam
//!
//! Authentication and network transport sit outside this crate; this stub
//! keeps the backend selectable behind the driver contract until a real
//! transport is linked in.

use crate::error::{DbError, DbResult};
use crate::traits::{Connection, ConnectionConfig, Driver};
use async_trait::async_trait;

/// Snowflake backend (stub implementation)
#[derive(Debug, Default)]
pub struct SnowflakeDriver;

impl SnowflakeDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for SnowflakeDriver {
    async fn connect(&self, _config: &ConnectionConfig) -> DbResult<Box<dyn Connection>> {
        Err(DbError::NotImplemented {
            backend: "snowflake",
            feature: "connection transport",
        })
    }

    fn backend(&self) -> &'static str {
        "snowflake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_not_implemented() {
        let driver = SnowflakeDriver::new();
        let err = driver.connect(&ConnectionConfig::default()).await.unwrap_err();
        assert!(matches!(err, DbError::NotImplemented { .. }));
        assert_eq!(driver.backend(), "snowflake");
    }
}
