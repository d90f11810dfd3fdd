use super::*;
use crate::mock::MockDriver;
use std::time::Duration;

fn pool_with(size: usize) -> (Arc<DriverPool>, Arc<crate::mock::MockBehaviour>) {
    let driver = MockDriver::new();
    let behaviour = driver.behaviour();
    let pool = DriverPool::new(
        Arc::new(driver),
        ConnectionConfig::default(),
        PoolConfig {
            size,
            acquire_timeout: Duration::from_millis(100),
            session_variables: BTreeMap::new(),
        },
    );
    (pool, behaviour)
}

#[tokio::test]
async fn test_acquire_and_release() {
    let (pool, behaviour) = pool_with(2);

    let mut conn = pool.acquire().await.unwrap();
    conn.execute("SELECT 1").await.unwrap();
    drop(conn);

    assert_eq!(behaviour.connect_count(), 1);
    assert_eq!(behaviour.executed_sql(), vec!["SELECT 1"]);

    // Released connection is reused, not reconnected
    let _conn = pool.acquire().await.unwrap();
    assert_eq!(behaviour.connect_count(), 1);
}

#[tokio::test]
async fn test_pool_bounded_with_timeout() {
    let (pool, _behaviour) = pool_with(2);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();

    // Third acquirer must time out while both are held
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, DbError::AcquireTimeout { .. }));

    drop(a);
    drop(b);
    assert!(pool.acquire().await.is_ok());
}

#[tokio::test]
async fn test_blocked_acquirer_wakes_on_release() {
    let (pool, _behaviour) = pool_with(1);

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(held);

    waiter.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unhealthy_connection_replaced() {
    let (pool, behaviour) = pool_with(1);

    let conn = pool.acquire().await.unwrap();
    drop(conn);
    assert_eq!(behaviour.connect_count(), 1);

    // Pooled connection goes unhealthy; the next acquire must not hand it
    // out. Health is only consulted for pooled reuse, so the replacement
    // connection is handed out regardless of the shared flag.
    behaviour.set_unhealthy(true);
    let _conn = pool.acquire().await.unwrap();
    assert_eq!(behaviour.connect_count(), 2);
}

#[tokio::test]
async fn test_session_variables_applied_in_one_batch() {
    let driver = MockDriver::new();
    let behaviour = driver.behaviour();
    let mut session_variables = BTreeMap::new();
    session_variables.insert("QUERY_TAG".to_string(), "cascade".to_string());
    session_variables.insert("TIMEZONE".to_string(), "UTC".to_string());

    let pool = DriverPool::new(
        Arc::new(driver),
        ConnectionConfig::default(),
        PoolConfig {
            size: 1,
            acquire_timeout: Duration::from_millis(100),
            session_variables,
        },
    );

    let _conn = pool.acquire().await.unwrap();

    // Exactly one batched round trip carrying both SET statements
    assert_eq!(behaviour.batch_call_count(), 1);
    let sql = behaviour.executed_sql();
    assert_eq!(sql.len(), 2);
    assert!(sql[0].contains("SET QUERY_TAG = 'cascade'"));
    assert!(sql[1].contains("SET TIMEZONE = 'UTC'"));
}

#[tokio::test]
async fn test_closed_pool_rejects_acquire() {
    let (pool, _behaviour) = pool_with(1);
    pool.close_all().await;
    assert!(matches!(pool.acquire().await, Err(DbError::PoolClosed)));
}

#[tokio::test]
async fn test_connect_failure_propagates() {
    let (pool, behaviour) = pool_with(1);
    behaviour.fail_connects(1);
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionFailed { .. }));

    // Permit released; a later acquire succeeds
    assert!(pool.acquire().await.is_ok());
}

#[test]
fn test_session_value_formatting() {
    assert_eq!(format_session_value("UTC"), "'UTC'");
    assert_eq!(format_session_value("42"), "42");
    assert_eq!(format_session_value("2.5"), "2.5");
    assert_eq!(format_session_value("true"), "true");
    assert_eq!(format_session_value("o'clock"), "'o''clock'");
}
