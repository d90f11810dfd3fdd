//! Date-range backfill for incremental models
//!
//! Replays a model over `[start, end]` in windows of `interval_days`,
//! injecting `start_date` and `end_date` as `$variable` bindings for each
//! window. The model is forced every window, so its SQL decides what the
//! window means (typically a `BETWEEN $start_date AND $end_date` filter).
//! Windows run in order; a failing window is recorded and the backfill
//! moves on to the next one.

use crate::error::ExecResult;
use crate::executor::{Executor, ExecutorOptions, RunSummary};
use cascade_core::{
    CoreError, DependencyGraph, ModelName, ModelRegistry, PlanOptions, Planner, SourceCatalog,
    StateStore,
};
use cascade_db::WarehouseClient;
use chrono::{Days, NaiveDate};
use serde_json::Value;

/// Date range and stride of a backfill
#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    /// First day to replay (inclusive)
    pub start: NaiveDate,

    /// Last day to replay (inclusive)
    pub end: NaiveDate,

    /// Days each window reaches beyond its start
    pub interval_days: u32,
}

/// One inclusive `[start, end]` slice of a backfill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl std::fmt::Display for BackfillWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

/// Outcome of a whole backfill: one run summary per window, in order
#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub windows: Vec<(BackfillWindow, RunSummary)>,
}

impl BackfillSummary {
    /// Windows in which at least one model failed.
    pub fn failed_windows(&self) -> usize {
        self.windows
            .iter()
            .filter(|(_, run)| run.failed() > 0)
            .count()
    }

    /// Process exit code: 0 when every window succeeded, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed_windows() > 0 {
            1
        } else {
            0
        }
    }
}

/// Split the range into windows. Each window ends `interval_days` after its
/// start (clamped to the range end); the next window starts the following
/// day, so no day is replayed twice.
pub fn windows(options: &BackfillOptions) -> Vec<BackfillWindow> {
    let stride = Days::new(u64::from(options.interval_days.max(1)));
    let mut windows = Vec::new();
    let mut current = options.start;

    while current <= options.end {
        let reach = current
            .checked_add_days(stride)
            .unwrap_or(options.end)
            .min(options.end);
        windows.push(BackfillWindow {
            start: current,
            end: reach,
        });

        match reach.checked_add_days(Days::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }

    windows
}

/// Replay one model across the date range, window by window.
///
/// Each window builds a forced single-model plan and runs it with the
/// window's `start_date`/`end_date` bound over the caller's variables, so
/// state (including high-watermarks) advances exactly as a normal run would.
#[allow(clippy::too_many_arguments)]
pub async fn run_backfill(
    client: &WarehouseClient,
    registry: &ModelRegistry,
    catalog: &SourceCatalog,
    graph: &DependencyGraph,
    model: &ModelName,
    mut state: StateStore,
    base_options: &ExecutorOptions,
    options: &BackfillOptions,
) -> ExecResult<(BackfillSummary, StateStore)> {
    if !registry.contains(model.as_str()) {
        return Err(CoreError::ModelNotFound {
            name: model.to_string(),
        }
        .into());
    }

    let mut summary = BackfillSummary::default();

    for window in windows(options) {
        let plan = Planner::new(registry, graph, state.snapshot()).build(&PlanOptions {
            filter: Some([model.clone()].into()),
            forced: [model.clone()].into(),
            include_unchanged: false,
        })?;

        let mut window_options = base_options.clone();
        window_options.variables.insert(
            "start_date".to_string(),
            Value::String(window.start.format("%Y-%m-%d").to_string()),
        );
        window_options.variables.insert(
            "end_date".to_string(),
            Value::String(window.end.format("%Y-%m-%d").to_string()),
        );

        let executor = Executor::new(client.clone(), registry, catalog, window_options);
        let (run, next_state) = executor.run(&plan, state).await?;
        state = next_state;

        if run.failed() > 0 {
            log::warn!("backfill window {} failed for {}", window, model);
        }
        summary.windows.push((window, run));
    }

    Ok((summary, state))
}

#[cfg(test)]
#[path = "backfill_test.rs"]
mod tests;
