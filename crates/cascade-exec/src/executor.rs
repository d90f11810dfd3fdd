//! Batch executor
//!
//! Drives a plan's batches in order. Batches run sequentially; within a
//! batch, models run concurrently bounded by the pool size. A model failure
//! never crashes the run: the model is recorded FAILED, its dependents are
//! SKIPPED, and the run continues unless fail-fast is set. State entries
//! flow through a single writer task so the snapshot is only ever mutated
//! from one place.

use crate::error::{ErrorContext, ExecError, ExecResult};
use crate::materialize::{materialise, MaterializeRequest};
use crate::resolve::Resolver;
use crate::vars::{substitute_variables, validate_declared};
use cascade_core::{
    CoreError, ModelConfig, ModelName, ModelRegistry, Plan, RunStatus, SourceCatalog, StateEntry,
    StateStore,
};
use cascade_db::WarehouseClient;
use cascade_template::{expand, ExpandContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Outcome of one model in one run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub model: ModelName,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<usize>,

    /// The materialised object's identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// New high-watermark reported by an incremental strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_watermark: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorContext>,
}

/// Everything a run produced
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub results: Vec<ExecutionResult>,

    /// Objects dropped for models removed from the registry
    pub deleted_objects: Vec<ModelName>,

    pub cancelled: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.count(RunStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(RunStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(RunStatus::Skipped)
    }

    fn count(&self, status: RunStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Process exit code: 0 when no model failed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 {
            1
        } else {
            0
        }
    }
}

/// Run-level options
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Stop dispatching after the first failure
    pub fail_fast: bool,

    /// `$variable` bindings
    pub variables: BTreeMap<String, Value>,

    /// Target database for physical identifiers
    pub database: Option<String>,

    /// Default target schema for physical identifiers
    pub schema: Option<String>,

    /// Cap on in-batch concurrency (defaults to the pool size)
    pub max_parallel: Option<usize>,
}

/// Messages to the single state-writer task
enum StateMessage {
    Record(StateEntry),
    Remove(ModelName),
}

/// One model, fully prepared for execution: SQL resolved and substituted,
/// prior state captured.
#[derive(Clone)]
struct PreparedModel {
    name: ModelName,
    fingerprint: String,
    physical: String,
    exec_sql: String,
    config: ModelConfig,
    previously_materialised: bool,
    high_watermark: Option<String>,
    prior_success_fingerprint: Option<String>,
}

/// Drives plans through the warehouse
pub struct Executor<'a> {
    client: WarehouseClient,
    registry: &'a ModelRegistry,
    catalog: &'a SourceCatalog,
    options: ExecutorOptions,
    cancel: Arc<AtomicBool>,
}

impl<'a> Executor<'a> {
    pub fn new(
        client: WarehouseClient,
        registry: &'a ModelRegistry,
        catalog: &'a SourceCatalog,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            client,
            registry,
            catalog,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that aborts further batch dispatch when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Execute a plan. The state store is threaded through the run's writer
    /// task and handed back with all outcomes recorded.
    pub async fn run(&self, plan: &Plan, state: StateStore) -> ExecResult<(RunSummary, StateStore)> {
        // Pre-flight: resolve and substitute every planned model up front so
        // missing variables abort before any warehouse work
        let prepared = self.prepare(plan, &state)?;

        let (tx, rx) = mpsc::unbounded_channel::<StateMessage>();
        let writer = tokio::spawn(state_writer(state, rx));

        let mut summary = RunSummary::default();
        let mut blocked: HashSet<ModelName> = HashSet::new();
        let mut any_failed = false;

        let parallelism = self
            .options
            .max_parallel
            .unwrap_or_else(|| self.client.pool().size())
            .clamp(1, self.client.pool().size());
        let semaphore = Arc::new(Semaphore::new(parallelism));

        'batches: for batch in &plan.batches {
            if self.cancel.load(Ordering::SeqCst) {
                summary.cancelled = true;
                break 'batches;
            }
            if any_failed && self.options.fail_fast {
                break 'batches;
            }

            let mut tasks: JoinSet<ExecutionResult> = JoinSet::new();
            for name in batch {
                let Some(model) = prepared.get(name) else {
                    continue;
                };

                // A model below a failed or skipped upstream is skipped, not run
                let upstream_blocked = self
                    .registry
                    .parsed(name.as_str())
                    .map(|p| p.depends_on.iter().any(|dep| blocked.contains(dep)))
                    .unwrap_or(false);
                if upstream_blocked {
                    let result = skipped_result(name, "upstream model failed");
                    blocked.insert(name.clone());
                    let _ = tx.send(StateMessage::Record(state_entry_for(model, &result)));
                    summary.results.push(result);
                    continue;
                }

                let client = self.client.clone();
                let model = model.clone();
                let semaphore = Arc::clone(&semaphore);
                let cancel = Arc::clone(&self.cancel);
                let tx = tx.clone();
                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return skipped_result(&model.name, "executor shut down");
                    };
                    if cancel.load(Ordering::SeqCst) {
                        return skipped_result(&model.name, "run cancelled");
                    }
                    let result = run_one(&client, &model).await;
                    let _ = tx.send(StateMessage::Record(state_entry_for(&model, &result)));
                    result
                });
            }

            let mut batch_results = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => batch_results.push(result),
                    Err(e) => log::warn!("model task join error: {}", e),
                }
            }

            // In-batch completion order is unspecified; report it stably
            batch_results.sort_by(|a, b| a.model.cmp(&b.model));
            for result in batch_results {
                match result.status {
                    RunStatus::Failed => {
                        any_failed = true;
                        blocked.insert(result.model.clone());
                    }
                    RunStatus::Skipped => {
                        blocked.insert(result.model.clone());
                    }
                    RunStatus::Success => {}
                }
                summary.results.push(result);
            }
        }

        // Terminal batch: drop objects for models that left the registry.
        // Only after a fully successful run, and never fatally.
        if !any_failed && !summary.cancelled {
            let resolver = Resolver::new(
                self.registry,
                self.catalog,
                self.options.database.as_deref(),
                self.options.schema.as_deref(),
            );
            for name in &plan.deletions {
                let physical = resolver.physical_identifier(name, None);
                if self.drop_object(&physical).await {
                    let _ = tx.send(StateMessage::Remove(name.clone()));
                    summary.deleted_objects.push(name.clone());
                } else {
                    log::warn!("failed to drop object for removed model '{}'", name);
                }
            }
        }

        drop(tx);
        let state = writer.await.map_err(|e| ExecError::StateWriter {
            message: e.to_string(),
        })?;

        Ok((summary, state))
    }

    /// Resolve, expand, and substitute every model in the plan.
    fn prepare(
        &self,
        plan: &Plan,
        state: &StateStore,
    ) -> ExecResult<HashMap<ModelName, PreparedModel>> {
        let resolver = Resolver::new(
            self.registry,
            self.catalog,
            self.options.database.as_deref(),
            self.options.schema.as_deref(),
        );

        let mut prepared = HashMap::new();
        for name in plan.models_to_execute() {
            let model = self.registry.get(name.as_str())?;
            let entry = state.get(name.as_str());
            let previously_materialised = entry
                .map(|e| e.previously_materialised())
                .unwrap_or(false);

            let physical = resolver.model_identifier(&name)?;

            // Runtime expansion with the real incremental flag and target
            let expansion = expand(
                &model.raw_sql,
                &ExpandContext {
                    this: Some(&physical),
                    is_incremental: previously_materialised,
                },
            )
            .map_err(|source| CoreError::Template {
                model: name.to_string(),
                source,
            })?;

            let resolved = resolver.resolve_sql(&expansion.sql, &physical)?;

            validate_declared(&model.config.vars, &self.options.variables, name.as_str())?;
            let exec_sql =
                substitute_variables(&resolved, &self.options.variables, name.as_str())?;

            prepared.insert(
                name.clone(),
                PreparedModel {
                    name: name.clone(),
                    fingerprint: model.fingerprint.clone(),
                    physical,
                    exec_sql,
                    config: model.config.clone(),
                    previously_materialised,
                    high_watermark: entry.and_then(|e| e.high_watermark.clone()),
                    prior_success_fingerprint: entry
                        .and_then(|e| e.last_successful_fingerprint.clone()),
                },
            );
        }
        Ok(prepared)
    }

    /// Drop a removed model's object, trying both relation kinds. Returns
    /// true when either drop succeeded.
    async fn drop_object(&self, physical: &str) -> bool {
        let table = format!("DROP TABLE IF EXISTS {}", physical);
        if self.client.execute(&table).await.is_ok() {
            return true;
        }
        let view = format!("DROP VIEW IF EXISTS {}", physical);
        self.client.execute(&view).await.is_ok()
    }
}

/// Materialise one prepared model and describe the outcome.
async fn run_one(client: &WarehouseClient, model: &PreparedModel) -> ExecutionResult {
    let started_at = Utc::now();

    let request = MaterializeRequest {
        name: &model.name,
        physical: &model.physical,
        select_sql: &model.exec_sql,
        config: &model.config,
        previously_materialised: model.previously_materialised,
        high_watermark: model.high_watermark.as_deref(),
    };

    match materialise(client, &request).await {
        Ok(outcome) => ExecutionResult {
            model: model.name.clone(),
            status: RunStatus::Success,
            started_at,
            finished_at: Utc::now(),
            rows_affected: outcome.rows_affected,
            object: Some(outcome.object),
            high_watermark: outcome.new_high_watermark,
            error: None,
        },
        Err(e) => {
            let context = e.context().cloned().unwrap_or_else(|| {
                ErrorContext::new("materialise")
                    .with_model(model.name.as_str())
                    .with_driver_error(&e)
            });
            ExecutionResult {
                model: model.name.clone(),
                status: RunStatus::Failed,
                started_at,
                finished_at: Utc::now(),
                rows_affected: None,
                object: None,
                high_watermark: None,
                error: Some(context),
            }
        }
    }
}

fn skipped_result(name: &ModelName, reason: &str) -> ExecutionResult {
    let now = Utc::now();
    ExecutionResult {
        model: name.clone(),
        status: RunStatus::Skipped,
        started_at: now,
        finished_at: now,
        rows_affected: None,
        object: None,
        high_watermark: None,
        error: Some(
            ErrorContext::new("skip")
                .with_model(name.as_str())
                .with_driver_error(reason),
        ),
    }
}

/// Build the state entry recording one model's outcome.
fn state_entry_for(model: &PreparedModel, result: &ExecutionResult) -> StateEntry {
    let succeeded = result.status == RunStatus::Success;
    StateEntry {
        model: model.name.clone(),
        fingerprint: model.fingerprint.clone(),
        status: result.status,
        last_successful_fingerprint: if succeeded {
            Some(model.fingerprint.clone())
        } else {
            model.prior_success_fingerprint.clone()
        },
        last_run: result.finished_at,
        high_watermark: if succeeded {
            result
                .high_watermark
                .clone()
                .or_else(|| model.high_watermark.clone())
        } else {
            model.high_watermark.clone()
        },
    }
}

/// The run's single state writer: applies every outcome and flushes after
/// each one, so a crash leaves the snapshot at the previous model's state.
async fn state_writer(
    mut state: StateStore,
    mut rx: mpsc::UnboundedReceiver<StateMessage>,
) -> StateStore {
    while let Some(message) = rx.recv().await {
        match message {
            StateMessage::Record(entry) => state.put(entry),
            StateMessage::Remove(name) => {
                state.remove(name.as_str());
            }
        }
        if let Err(e) = state.flush() {
            log::warn!("failed to flush state snapshot: {}", e);
        }
    }
    state
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
