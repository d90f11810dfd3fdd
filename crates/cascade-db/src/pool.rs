//! Bounded connection pool
//!
//! Invariants: never more than `size` connections handed out at once; an
//! unhealthy connection is never handed out; acquirers block (with timeout)
//! when the pool is exhausted. Health checks inspect cached driver state
//! only, no probe queries. Session variables are applied with one batched
//! round trip at acquire time.

use crate::error::{DbError, DbResult};
use crate::traits::{Connection, ConnectionConfig, Driver};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pool sizing and session policy
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum live connections
    pub size: usize,

    /// How long an acquirer waits for a free slot
    pub acquire_timeout: Duration,

    /// Session variables applied to every acquired connection
    pub session_variables: BTreeMap<String, String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 5,
            acquire_timeout: Duration::from_secs(30),
            session_variables: BTreeMap::new(),
        }
    }
}

/// Bounded pool of warehouse connections
pub struct DriverPool {
    driver: Arc<dyn Driver>,
    connection_config: ConnectionConfig,
    config: PoolConfig,
    free: Mutex<VecDeque<Box<dyn Connection>>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl std::fmt::Debug for DriverPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverPool")
            .field("backend", &self.driver.backend())
            .field("size", &self.config.size)
            .finish_non_exhaustive()
    }
}

impl DriverPool {
    /// Create a pool. Connections are opened lazily on acquire, up to
    /// `config.size` concurrently live.
    pub fn new(
        driver: Arc<dyn Driver>,
        connection_config: ConnectionConfig,
        config: PoolConfig,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.size.max(1)));
        Arc::new(Self {
            driver,
            connection_config,
            config,
            free: Mutex::new(VecDeque::new()),
            permits,
            closed: AtomicBool::new(false),
        })
    }

    /// Pool capacity.
    pub fn size(&self) -> usize {
        self.config.size.max(1)
    }

    /// Acquire a connection, blocking up to the configured timeout when the
    /// pool is exhausted.
    pub async fn acquire(self: &Arc<Self>) -> DbResult<PooledConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::PoolClosed);
        }

        let started = Instant::now();
        let permit = match tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DbError::PoolClosed),
            Err(_) => {
                return Err(DbError::AcquireTimeout {
                    waited_ms: started.elapsed().as_millis(),
                })
            }
        };

        let mut conn = loop {
            let pooled = self.pop_free();
            match pooled {
                Some(conn) if conn.is_healthy() => break conn,
                Some(conn) => {
                    // Unhealthy connections are dropped, never handed out
                    log::warn!("discarding unhealthy pooled connection");
                    drop(conn);
                }
                None => break self.driver.connect(&self.connection_config).await?,
            }
        };

        if !self.config.session_variables.is_empty() {
            let statements: Vec<String> = self
                .config
                .session_variables
                .iter()
                .map(|(name, value)| format!("SET {} = {}", name, format_session_value(value)))
                .collect();
            // One batched round trip per acquisition
            if let Err(e) = conn.execute_many(&statements).await {
                drop(conn);
                return Err(e);
            }
        }

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
            discarded: false,
        })
    }

    /// Close the pool: no further acquires; free connections are dropped.
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut free) = self.free.lock() {
            free.clear();
        }
    }

    fn pop_free(&self) -> Option<Box<dyn Connection>> {
        self.free.lock().ok()?.pop_front()
    }

    fn push_free(&self, conn: Box<dyn Connection>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut free) = self.free.lock() {
            free.push_back(conn);
        }
    }
}

/// Quote string values for `SET name = value`; pass numerics and booleans
/// through unquoted.
fn format_session_value(value: &str) -> String {
    let bare = value.parse::<f64>().is_ok()
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("false");
    if bare {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// A connection checked out of the pool. Returned to the free-list on drop
/// unless [`discard`](PooledConnection::discard) was called.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<DriverPool>,
    _permit: OwnedSemaphorePermit,
    discarded: bool,
}

impl PooledConnection {
    /// Drop the underlying connection instead of returning it to the pool
    /// (connection-level failures).
    pub fn discard(mut self) {
        self.discarded = true;
        self.conn.take();
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Box<dyn Connection>;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.discarded {
            return;
        }
        if let Some(conn) = self.conn.take() {
            self.pool.push_free(conn);
        }
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
