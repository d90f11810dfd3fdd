//! cascade-db - Warehouse access layer for Cascade
//!
//! Defines the driver contract any warehouse backend must satisfy, a bounded
//! connection pool with session-variable policy, a retrying client, a mock
//! driver for tests, and the Snowflake driver seam.

pub mod client;
pub mod error;
pub mod mock;
pub mod pool;
pub mod retry;
pub mod snowflake;
pub mod traits;

pub use client::WarehouseClient;
pub use error::{DbError, DbErrorKind, DbResult};
pub use mock::{MockBehaviour, MockDriver};
pub use pool::{DriverPool, PoolConfig, PooledConnection};
pub use retry::RetryPolicy;
pub use snowflake::SnowflakeDriver;
pub use traits::{Connection, ConnectionConfig, Driver, QueryOutput};
