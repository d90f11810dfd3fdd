use super::*;
use crate::mock::MockDriver;
use crate::pool::{DriverPool, PoolConfig};
use crate::traits::{ConnectionConfig, QueryOutput};
use serde_json::json;
use std::time::Duration;

fn client() -> (WarehouseClient, Arc<crate::mock::MockBehaviour>) {
    let driver = MockDriver::new();
    let behaviour = driver.behaviour();
    let pool = DriverPool::new(
        Arc::new(driver),
        ConnectionConfig::default(),
        PoolConfig {
            size: 2,
            acquire_timeout: Duration::from_millis(200),
            session_variables: Default::default(),
        },
    );
    let retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        factor: 2.0,
        jitter: 0.0,
    };
    (WarehouseClient::new(pool, retry), behaviour)
}

#[tokio::test]
async fn test_execute_success() {
    let (client, behaviour) = client();
    behaviour.enqueue_result(
        "SELECT 1",
        QueryOutput {
            columns: vec!["x".to_string()],
            rows: vec![vec![json!(1)]],
            rows_affected: None,
        },
    );

    let output = client.execute("SELECT 1 AS x").await.unwrap();
    assert_eq!(output.scalar(), Some(&json!(1)));
}

#[tokio::test]
async fn test_transient_error_retried_same_call() {
    let (client, behaviour) = client();
    behaviour.fail_times("CREATE TABLE", DbErrorKind::Transient, 2);

    client.execute("CREATE TABLE t AS SELECT 1").await.unwrap();

    // Two failures + one success, all the same logical statement
    assert_eq!(behaviour.count_matching("CREATE TABLE"), 3);
}

#[tokio::test]
async fn test_transient_errors_exhaust_attempts() {
    let (client, behaviour) = client();
    behaviour.fail_times("CREATE TABLE", DbErrorKind::Transient, 5);

    let err = client.execute("CREATE TABLE t AS SELECT 1").await.unwrap_err();
    assert_eq!(err.kind(), DbErrorKind::Transient);
    assert_eq!(behaviour.count_matching("CREATE TABLE"), 3);
}

#[tokio::test]
async fn test_connection_lost_reconnects() {
    let (client, behaviour) = client();
    behaviour.fail_times("SELECT", DbErrorKind::ConnectionLost, 1);

    client.execute("SELECT 1").await.unwrap();

    // The broken connection was discarded, forcing a second connect
    assert_eq!(behaviour.connect_count(), 2);
}

#[tokio::test]
async fn test_permanent_error_not_retried() {
    let (client, behaviour) = client();
    behaviour.fail_times("SELECT", DbErrorKind::Permanent, 1);

    let err = client.execute("SELECT broken").await.unwrap_err();
    assert_eq!(err.kind(), DbErrorKind::Permanent);
    assert_eq!(behaviour.count_matching("SELECT"), 1);
}

#[tokio::test]
async fn test_query_scalar() {
    let (client, behaviour) = client();
    behaviour.enqueue_result(
        "COUNT",
        QueryOutput {
            columns: vec!["CNT".to_string()],
            rows: vec![vec![json!(7)]],
            rows_affected: None,
        },
    );

    let value = client.query_scalar("SELECT COUNT(*) FROM t").await.unwrap();
    assert_eq!(value, Some(json!(7)));

    let missing = client.query_scalar("SELECT * FROM empty").await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn test_bulk_insert_returns_count() {
    let (client, behaviour) = client();
    let rows = vec![vec![json!(1)], vec![json!(2)]];
    let count = client
        .bulk_insert("t", &["id".to_string()], rows)
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(behaviour.count_matching("BULK INSERT t"), 1);
}
