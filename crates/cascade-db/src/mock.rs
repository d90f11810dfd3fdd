//! In-memory mock driver for tests and dry exercising
//!
//! Connections share one `MockBehaviour`: every executed statement is
//! recorded, responses can be scripted by substring pattern, and failures
//! can be injected a fixed number of times to exercise the retry paths.

use crate::error::{DbError, DbErrorKind, DbResult};
use crate::traits::{Connection, ConnectionConfig, Driver, QueryOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct ScriptedResult {
    pattern: String,
    output: QueryOutput,
}

#[derive(Debug)]
struct FailureRule {
    pattern: String,
    kind: DbErrorKind,
    remaining: usize,
}

/// Shared scripted behaviour for every connection of one mock driver
#[derive(Default, Debug)]
pub struct MockBehaviour {
    log: Mutex<Vec<String>>,
    queued: Mutex<Vec<ScriptedResult>>,
    defaults: Mutex<Vec<ScriptedResult>>,
    failures: Mutex<Vec<FailureRule>>,
    unhealthy: AtomicBool,
    connects: AtomicUsize,
    connect_failures: AtomicUsize,
    batch_calls: AtomicUsize,
    cancels: AtomicUsize,
}

impl MockBehaviour {
    /// Queue a one-shot result for the first statement containing `pattern`.
    pub fn enqueue_result(&self, pattern: &str, output: QueryOutput) {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push(ScriptedResult {
                pattern: pattern.to_string(),
                output,
            });
        }
    }

    /// Register a persistent result for statements containing `pattern`,
    /// replacing any earlier rule for the same pattern.
    pub fn set_default_result(&self, pattern: &str, output: QueryOutput) {
        if let Ok(mut defaults) = self.defaults.lock() {
            defaults.retain(|r| r.pattern != pattern);
            defaults.push(ScriptedResult {
                pattern: pattern.to_string(),
                output,
            });
        }
    }

    /// Fail the next `times` statements containing `pattern` with `kind`.
    pub fn fail_times(&self, pattern: &str, kind: DbErrorKind, times: usize) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(FailureRule {
                pattern: pattern.to_string(),
                kind,
                remaining: times,
            });
        }
    }

    /// Make every connection report unhealthy (or healthy again).
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// Fail the next `times` connection attempts.
    pub fn fail_connects(&self, times: usize) {
        self.connect_failures.store(times, Ordering::SeqCst);
    }

    /// Every statement executed so far, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Count of executed statements containing `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.executed_sql()
            .iter()
            .filter(|sql| sql.contains(pattern))
            .count()
    }

    /// Number of connections opened.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of `execute_many` round trips.
    pub fn batch_call_count(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of cancel requests received.
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    fn record(&self, sql: &str) {
        if let Ok(mut log) = self.log.lock() {
            log.push(sql.to_string());
        }
    }

    fn check_failure(&self, sql: &str) -> DbResult<()> {
        if let Ok(mut failures) = self.failures.lock() {
            for rule in failures.iter_mut() {
                if rule.remaining > 0 && (rule.pattern.is_empty() || sql.contains(&rule.pattern)) {
                    rule.remaining -= 1;
                    return Err(DbError::Driver {
                        kind: rule.kind,
                        message: format!("injected failure for '{}'", rule.pattern),
                    });
                }
            }
        }
        Ok(())
    }

    fn response_for(&self, sql: &str) -> QueryOutput {
        if let Ok(mut queued) = self.queued.lock() {
            if let Some(pos) = queued
                .iter()
                .position(|r| r.pattern.is_empty() || sql.contains(&r.pattern))
            {
                return queued.remove(pos).output;
            }
        }
        if let Ok(defaults) = self.defaults.lock() {
            if let Some(hit) = defaults
                .iter()
                .find(|r| r.pattern.is_empty() || sql.contains(&r.pattern))
            {
                return hit.output.clone();
            }
        }
        QueryOutput::empty()
    }
}

/// Mock driver; all connections share the driver's behaviour
#[derive(Default)]
pub struct MockDriver {
    behaviour: Arc<MockBehaviour>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for scripting and inspection.
    pub fn behaviour(&self) -> Arc<MockBehaviour> {
        Arc::clone(&self.behaviour)
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn connect(&self, _config: &ConnectionConfig) -> DbResult<Box<dyn Connection>> {
        let pending = self.behaviour.connect_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.behaviour
                .connect_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(DbError::ConnectionFailed {
                message: "injected connect failure".to_string(),
            });
        }
        self.behaviour.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            behaviour: Arc::clone(&self.behaviour),
        }))
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug)]
struct MockConnection {
    behaviour: Arc<MockBehaviour>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, sql: &str) -> DbResult<QueryOutput> {
        self.behaviour.record(sql);
        self.behaviour.check_failure(sql)?;
        Ok(self.behaviour.response_for(sql))
    }

    async fn execute_many(&mut self, statements: &[String]) -> DbResult<()> {
        self.behaviour.batch_calls.fetch_add(1, Ordering::SeqCst);
        for sql in statements {
            self.behaviour.record(sql);
            self.behaviour.check_failure(sql)?;
        }
        Ok(())
    }

    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> DbResult<usize> {
        let count = rows.len();
        self.behaviour.record(&format!(
            "BULK INSERT {} ({}) [{} rows]",
            table,
            columns.join(", "),
            count
        ));
        self.behaviour.check_failure("BULK INSERT")?;
        Ok(count)
    }

    fn is_healthy(&self) -> bool {
        !self.behaviour.unhealthy.load(Ordering::SeqCst)
    }

    async fn cancel(&self) -> DbResult<()> {
        self.behaviour.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
