//! Materialisation strategy dispatch
//!
//! One tagged-variant dispatch instead of a strategy class hierarchy: the
//! materialisation kind selects the statement shape. All strategies satisfy
//! the same contract and are resilient to the target not existing yet.

use crate::cdc::execute_cdc;
use crate::error::{ErrorContext, ExecError, ExecResult};
use crate::incremental::execute_incremental;
use cascade_db::{DbError, WarehouseClient};
use cascade_core::{Materialization, ModelConfig, ModelName};

/// Everything a strategy needs to materialise one model
#[derive(Debug)]
pub struct MaterializeRequest<'a> {
    /// Model name
    pub name: &'a ModelName,

    /// Physical identifier of the target object
    pub physical: &'a str,

    /// Fully resolved, variable-substituted SELECT
    pub select_sql: &'a str,

    /// Effective model configuration
    pub config: &'a ModelConfig,

    /// Whether a previous run materialised this model successfully
    pub previously_materialised: bool,

    /// Stored high-watermark from the last successful run
    pub high_watermark: Option<&'a str>,
}

/// What a strategy reports back
#[derive(Debug, Clone, Default)]
pub struct MaterializeOutcome {
    /// The object that was created or updated
    pub object: String,

    /// Rows affected, when known
    pub rows_affected: Option<usize>,

    /// New high-watermark to persist (incremental strategies)
    pub new_high_watermark: Option<String>,
}

/// Materialise one model according to its configured kind.
pub async fn materialise(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
) -> ExecResult<MaterializeOutcome> {
    match request.config.materialized {
        Materialization::View => {
            let sql = format!(
                "CREATE OR REPLACE VIEW {} AS\n{}",
                request.physical, request.select_sql
            );
            run(client, request, "create view", &sql).await?;
            Ok(MaterializeOutcome {
                object: request.physical.to_string(),
                rows_affected: None,
                new_high_watermark: None,
            })
        }
        Materialization::Table => {
            let sql = format!(
                "CREATE OR REPLACE TABLE {}{} AS\n{}",
                request.physical,
                cluster_clause(request.config),
                request.select_sql
            );
            let output = run(client, request, "create table", &sql).await?;
            Ok(MaterializeOutcome {
                object: request.physical.to_string(),
                rows_affected: output.rows_affected,
                new_high_watermark: None,
            })
        }
        Materialization::TempTable => {
            let sql = format!(
                "CREATE OR REPLACE TEMPORARY TABLE {} AS\n{}",
                request.physical, request.select_sql
            );
            let output = run(client, request, "create temp table", &sql).await?;
            Ok(MaterializeOutcome {
                object: request.physical.to_string(),
                rows_affected: output.rows_affected,
                new_high_watermark: None,
            })
        }
        Materialization::Incremental => execute_incremental(client, request).await,
        Materialization::Cdc => execute_cdc(client, request).await,
    }
}

/// CLUSTER BY clause for table-shaped targets, when configured.
pub(crate) fn cluster_clause(config: &ModelConfig) -> String {
    if config.cluster_by.is_empty() {
        String::new()
    } else {
        format!(" CLUSTER BY ({})", config.cluster_by.join(", "))
    }
}

/// Execute a statement on behalf of a request, wrapping driver failures in
/// model-level context.
pub(crate) async fn run(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
    operation: &str,
    sql: &str,
) -> ExecResult<cascade_db::QueryOutput> {
    client
        .execute(sql)
        .await
        .map_err(|e| driver_failure(client, request, operation, sql, e))
}

/// Wrap a driver error with the failing model's context.
pub(crate) fn driver_failure(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
    operation: &str,
    sql: &str,
    error: DbError,
) -> ExecError {
    let mut context = ErrorContext::new(operation)
        .with_model(request.name.as_str())
        .with_sql(sql)
        .with_driver_error(&error);
    // A transient error surfacing here has already exhausted its retries
    if error.kind() == cascade_db::DbErrorKind::Transient {
        context = context.with_retries(client.retry_attempts());
    }
    ExecError::ModelExecutionFailure {
        model: request.name.to_string(),
        context,
    }
}

/// Check whether the target relation already exists.
pub(crate) async fn relation_exists(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
) -> ExecResult<bool> {
    let leaf = request
        .physical
        .rsplit('.')
        .next()
        .unwrap_or(request.physical);
    let sql = format!(
        "SELECT COUNT(*) AS cnt FROM information_schema.tables WHERE table_name = '{}'",
        leaf.to_uppercase()
    );
    let output = run(client, request, "existence check", &sql).await?;
    Ok(scalar_to_usize(output.scalar()) > 0)
}

/// Interpret a numeric-or-string scalar cell as a count.
pub(crate) fn scalar_to_usize(value: Option<&serde_json::Value>) -> usize {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Apply `on_schema_change = append_new_columns`: probe the SELECT's columns
/// against the target's and ALTER TABLE ADD COLUMN for anything missing.
/// Column types cannot be inferred through the driver contract, so new
/// columns are added as VARCHAR.
pub(crate) async fn append_new_columns(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
) -> ExecResult<()> {
    let probe_select = format!("SELECT * FROM ({}) WHERE 1 = 0", request.select_sql);
    let select_output = run(client, request, "schema probe", &probe_select).await?;

    let probe_target = format!("SELECT * FROM {} WHERE 1 = 0", request.physical);
    let target_output = run(client, request, "schema probe", &probe_target).await?;

    let existing: std::collections::BTreeSet<String> = target_output
        .columns
        .iter()
        .map(|c| c.to_lowercase())
        .collect();

    for column in &select_output.columns {
        if !existing.contains(&column.to_lowercase()) {
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} VARCHAR",
                request.physical, column
            );
            run(client, request, "append new column", &sql).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "materialize_test.rs"]
mod tests;
