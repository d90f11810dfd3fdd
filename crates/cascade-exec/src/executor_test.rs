use super::*;
use cascade_core::{compile_all, Planner, PlanOptions};
use cascade_db::{ConnectionConfig, DriverPool, MockDriver, PoolConfig, RetryPolicy};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

struct Harness {
    registry: ModelRegistry,
    catalog: SourceCatalog,
    graph: cascade_core::DependencyGraph,
    client: WarehouseClient,
    behaviour: Arc<cascade_db::MockBehaviour>,
    state_dir: tempfile::TempDir,
}

fn harness(models: &[(&str, &str)]) -> Harness {
    let mut registry = ModelRegistry::new();
    for (path, sql) in models {
        registry.register(Path::new(path), sql).unwrap();
    }
    let catalog = SourceCatalog::empty();
    let report = compile_all(&mut registry, &catalog).unwrap();

    let driver = MockDriver::new();
    let behaviour = driver.behaviour();
    let pool = DriverPool::new(
        Arc::new(driver),
        ConnectionConfig::default(),
        PoolConfig {
            size: 4,
            acquire_timeout: Duration::from_millis(500),
            session_variables: Default::default(),
        },
    );
    let retry = RetryPolicy {
        initial_backoff: Duration::from_millis(1),
        jitter: 0.0,
        ..RetryPolicy::default()
    };

    Harness {
        registry,
        catalog,
        graph: report.graph,
        client: WarehouseClient::new(pool, retry),
        behaviour,
        state_dir: tempfile::tempdir().unwrap(),
    }
}

impl Harness {
    fn state(&self) -> StateStore {
        StateStore::open(self.state_dir.path(), "dev").unwrap()
    }

    fn plan(&self, state: &StateStore) -> Plan {
        Planner::new(&self.registry, &self.graph, state.snapshot())
            .build(&PlanOptions::default())
            .unwrap()
    }

    fn executor(&self, options: ExecutorOptions) -> Executor<'_> {
        Executor::new(self.client.clone(), &self.registry, &self.catalog, options)
    }

    fn options(&self) -> ExecutorOptions {
        ExecutorOptions {
            database: Some("DB".to_string()),
            schema: Some("MAIN".to_string()),
            ..ExecutorOptions::default()
        }
    }
}

#[tokio::test]
async fn test_single_view_from_empty_state() {
    let h = harness(&[("silver/a.sql", "SELECT 1 AS x")]);
    let state = h.state();
    let plan = h.plan(&state);
    assert_eq!(plan.reason_of("silver.a"), Some(cascade_core::ChangeReason::New));

    let (summary, state) = h.executor(h.options()).run(&plan, state).await.unwrap();

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.exit_code(), 0);
    assert!(h
        .behaviour
        .executed_sql()
        .contains(&"CREATE OR REPLACE VIEW DB.silver.a AS\nSELECT 1 AS x".to_string()));

    // State recorded the fingerprint
    let entry = state.get("silver.a").unwrap();
    assert_eq!(entry.status, RunStatus::Success);
    assert_eq!(
        entry.fingerprint,
        h.registry.get("silver.a").unwrap().fingerprint
    );
}

#[tokio::test]
async fn test_unchanged_replan_runs_nothing() {
    let h = harness(&[("silver/a.sql", "SELECT 1 AS x")]);
    let state = h.state();
    let plan = h.plan(&state);
    let (_, state) = h.executor(h.options()).run(&plan, state).await.unwrap();

    let before = h.behaviour.executed_sql().len();
    let replan = h.plan(&state);
    assert!(replan.is_noop());

    let (summary, _) = h.executor(h.options()).run(&replan, state).await.unwrap();
    assert!(summary.results.is_empty());
    // No warehouse calls on an empty plan
    assert_eq!(h.behaviour.executed_sql().len(), before);
}

#[tokio::test]
async fn test_partial_failure_continues_and_skips_dependents() {
    let h = harness(&[
        ("x.sql", "SELECT 1 AS a"),
        ("y.sql", "SELECT 2 AS b"),
        ("z.sql", "SELECT * FROM {{ ref('x') }}"),
    ]);
    h.behaviour
        .fail_times("VIEW DB.MAIN.x", cascade_db::DbErrorKind::Permanent, 1);

    let state = h.state();
    let plan = h.plan(&state);
    let (summary, state) = h.executor(h.options()).run(&plan, state).await.unwrap();

    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.exit_code(), 1);

    assert_eq!(state.get("x").unwrap().status, RunStatus::Failed);
    assert_eq!(state.get("y").unwrap().status, RunStatus::Success);
    assert_eq!(state.get("z").unwrap().status, RunStatus::Skipped);

    // The skipped model never reached the warehouse
    assert_eq!(h.behaviour.count_matching("DB.MAIN.z"), 0);
}

#[tokio::test]
async fn test_failed_state_preserves_last_success_fingerprint() {
    let h = harness(&[("x.sql", "SELECT 1 AS a")]);
    let state = h.state();
    let plan = h.plan(&state);
    let (_, state) = h.executor(h.options()).run(&plan, state).await.unwrap();
    let good_fingerprint = state
        .get("x")
        .unwrap()
        .last_successful_fingerprint
        .clone()
        .unwrap();

    // Force a re-run that fails
    let mut h = h;
    h.registry
        .register(Path::new("x.sql"), "SELECT 2 AS a")
        .unwrap();
    let report = compile_all(&mut h.registry, &h.catalog).unwrap();
    h.graph = report.graph;
    h.behaviour
        .fail_times("VIEW DB.MAIN.x", cascade_db::DbErrorKind::Permanent, 1);

    let plan = h.plan(&state);
    let (summary, state) = h.executor(h.options()).run(&plan, state).await.unwrap();
    assert_eq!(summary.failed(), 1);

    let entry = state.get("x").unwrap();
    assert_eq!(entry.status, RunStatus::Failed);
    assert_eq!(
        entry.last_successful_fingerprint.as_deref(),
        Some(good_fingerprint.as_str())
    );
}

#[tokio::test]
async fn test_fail_fast_stops_dispatch() {
    let h = harness(&[
        ("a.sql", "SELECT 1 AS x"),
        ("b.sql", "SELECT * FROM {{ ref('a') }}"),
    ]);
    h.behaviour
        .fail_times("VIEW DB.MAIN.a", cascade_db::DbErrorKind::Permanent, 1);

    let state = h.state();
    let plan = h.plan(&state);
    let options = ExecutorOptions {
        fail_fast: true,
        ..h.options()
    };
    let (summary, _) = h.executor(options).run(&plan, state).await.unwrap();

    assert_eq!(summary.failed(), 1);
    // The second batch was never dispatched
    assert_eq!(h.behaviour.count_matching("DB.MAIN.b"), 0);
}

#[tokio::test]
async fn test_missing_variable_aborts_before_execution() {
    let h = harness(&[(
        "a.sql",
        "-- config: vars=start_date\nSELECT * FROM t WHERE d >= $start_date",
    )]);
    let state = h.state();
    let plan = h.plan(&state);

    let err = h
        .executor(h.options())
        .run(&plan, state)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::MissingVariable { .. }));
    // Nothing reached the warehouse
    assert!(h.behaviour.executed_sql().is_empty());
}

#[tokio::test]
async fn test_variable_substitution_applied() {
    let h = harness(&[("a.sql", "SELECT * FROM t WHERE d >= $start_date")]);
    let state = h.state();
    let plan = h.plan(&state);
    let options = ExecutorOptions {
        variables: [("start_date".to_string(), json!("2024-01-01"))].into(),
        ..h.options()
    };

    let (summary, _) = h.executor(options).run(&plan, state).await.unwrap();
    assert_eq!(summary.succeeded(), 1);
    assert!(h
        .behaviour
        .executed_sql()
        .iter()
        .any(|s| s.contains("WHERE d >= '2024-01-01'")));
}

#[tokio::test]
async fn test_incremental_flag_and_this_resolution() {
    let h = harness(&[(
        "silver/inc.sql",
        "-- config: materialized=incremental, incremental_strategy=time, time_column=ts\n\
         SELECT * FROM t {% if is_incremental() %}WHERE ts > (SELECT MAX(ts) FROM {{ this }}){% endif %}",
    )]);
    h.behaviour.set_default_result(
        "information_schema.tables",
        cascade_db::QueryOutput {
            columns: vec!["CNT".to_string()],
            rows: vec![vec![json!(0)]],
            rows_affected: None,
        },
    );
    h.behaviour.set_default_result(
        "MAX(ts)",
        cascade_db::QueryOutput {
            columns: vec!["HIGH_WATERMARK".to_string()],
            rows: vec![vec![json!("2024-01-01")]],
            rows_affected: None,
        },
    );

    // First run: not incremental, guard absent
    let state = h.state();
    let plan = h.plan(&state);
    let (_, state) = h.executor(h.options()).run(&plan, state).await.unwrap();
    let create = h
        .behaviour
        .executed_sql()
        .into_iter()
        .find(|s| s.starts_with("CREATE TABLE"))
        .unwrap();
    assert!(!create.contains("WHERE ts >"));
    assert_eq!(
        state.get("silver.inc").unwrap().high_watermark.as_deref(),
        Some("2024-01-01")
    );

    // Second run (forced): incremental, guard present and this resolved
    h.behaviour.set_default_result(
        "information_schema.tables",
        cascade_db::QueryOutput {
            columns: vec!["CNT".to_string()],
            rows: vec![vec![json!(1)]],
            rows_affected: None,
        },
    );
    let plan = Planner::new(&h.registry, &h.graph, state.snapshot())
        .build(&PlanOptions {
            forced: [ModelName::new("silver.inc")].into(),
            ..PlanOptions::default()
        })
        .unwrap();
    let (_, _) = h.executor(h.options()).run(&plan, state).await.unwrap();

    let insert = h
        .behaviour
        .executed_sql()
        .into_iter()
        .rev()
        .find(|s| s.starts_with("INSERT INTO"))
        .unwrap();
    assert!(insert.contains("WHERE ts > (SELECT MAX(ts) FROM DB.silver.inc)"));
}

#[tokio::test]
async fn test_deletions_dropped_after_success() {
    let h = harness(&[("a.sql", "SELECT 1 AS x")]);
    let mut state = h.state();
    state.put(StateEntry {
        model: ModelName::new("old.gone"),
        fingerprint: "f".to_string(),
        status: RunStatus::Success,
        last_successful_fingerprint: Some("f".to_string()),
        last_run: Utc::now(),
        high_watermark: None,
    });

    let plan = h.plan(&state);
    assert_eq!(plan.deletions, vec![ModelName::new("old.gone")]);

    let (summary, state) = h.executor(h.options()).run(&plan, state).await.unwrap();
    assert_eq!(summary.deleted_objects, vec![ModelName::new("old.gone")]);
    assert!(state.get("old.gone").is_none());
    assert!(h
        .behaviour
        .executed_sql()
        .iter()
        .any(|s| s.starts_with("DROP TABLE IF EXISTS DB.old.gone")));
}

#[tokio::test]
async fn test_deletions_withheld_after_failure() {
    let h = harness(&[("a.sql", "SELECT 1 AS x")]);
    let mut state = h.state();
    state.put(StateEntry {
        model: ModelName::new("old.gone"),
        fingerprint: "f".to_string(),
        status: RunStatus::Success,
        last_successful_fingerprint: Some("f".to_string()),
        last_run: Utc::now(),
        high_watermark: None,
    });
    h.behaviour
        .fail_times("VIEW DB.MAIN.a", cascade_db::DbErrorKind::Permanent, 1);

    let plan = h.plan(&state);
    let (summary, state) = h.executor(h.options()).run(&plan, state).await.unwrap();

    assert!(summary.deleted_objects.is_empty());
    assert!(state.get("old.gone").is_some());
    assert!(!h
        .behaviour
        .executed_sql()
        .iter()
        .any(|s| s.starts_with("DROP TABLE")));
}

#[tokio::test]
async fn test_cancellation_stops_batches() {
    let h = harness(&[("a.sql", "SELECT 1 AS x")]);
    let state = h.state();
    let plan = h.plan(&state);

    let executor = h.executor(h.options());
    executor.cancel_flag().store(true, Ordering::SeqCst);
    let (summary, _) = executor.run(&plan, state).await.unwrap();

    assert!(summary.cancelled);
    assert!(summary.results.is_empty());
    assert!(h.behaviour.executed_sql().is_empty());
}

#[tokio::test]
async fn test_batch_results_reported_in_name_order() {
    let h = harness(&[
        ("zeta.sql", "SELECT 1 AS x"),
        ("alpha.sql", "SELECT 2 AS y"),
    ]);
    let state = h.state();
    let plan = h.plan(&state);
    let (summary, _) = h.executor(h.options()).run(&plan, state).await.unwrap();

    let order: Vec<&str> = summary.results.iter().map(|r| r.model.as_str()).collect();
    assert_eq!(order, vec!["alpha", "zeta"]);
}

#[tokio::test]
async fn test_state_flushed_per_model() {
    let h = harness(&[
        ("a.sql", "SELECT 1 AS x"),
        ("b.sql", "SELECT * FROM {{ ref('a') }}"),
    ]);
    let state = h.state();
    let plan = h.plan(&state);
    let (_, _state) = h.executor(h.options()).run(&plan, state).await.unwrap();

    // The snapshot on disk has both entries after the run
    let reloaded = StateStore::open(h.state_dir.path(), "dev").unwrap();
    assert!(reloaded.get("a").is_some());
    assert!(reloaded.get("b").is_some());
}
