//! Incremental materialisation sub-strategies
//!
//! - `append`: first run creates the table; later runs insert rows whose
//!   time column exceeds the stored high-watermark.
//! - `time`: plain insert on later runs; the model guards itself with an
//!   `is_incremental()` block referring to `MAX(time_col)` in the target.
//! - `unique_key`: MERGE through a temporary table on the configured key.
//!
//! After an append/time run the new high-watermark is read back from the
//! target (`MAX(time_col)`) and persisted with the model's state entry.

use crate::error::{ExecError, ExecResult};
use crate::materialize::{
    append_new_columns, cluster_clause, relation_exists, run, MaterializeOutcome,
    MaterializeRequest,
};
use cascade_db::WarehouseClient;
use cascade_core::{IncrementalStrategy, OnSchemaChange};

pub(crate) async fn execute_incremental(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
) -> ExecResult<MaterializeOutcome> {
    let strategy = request.config.incremental_strategy.unwrap_or_default();

    if !relation_exists(client, request).await? {
        return initial_load(client, request).await;
    }

    if request.config.on_schema_change == Some(OnSchemaChange::AppendNewColumns) {
        append_new_columns(client, request).await?;
    }

    let output = match strategy {
        IncrementalStrategy::Append => {
            let sql = match (&request.config.time_column, request.high_watermark) {
                (Some(time_column), Some(watermark)) => format!(
                    "INSERT INTO {} SELECT * FROM ({}) WHERE {} > '{}'",
                    request.physical,
                    request.select_sql,
                    time_column,
                    watermark.replace('\'', "''")
                ),
                _ => format!("INSERT INTO {}\n{}", request.physical, request.select_sql),
            };
            run(client, request, "incremental append", &sql).await?
        }
        IncrementalStrategy::Time => {
            // The is_incremental() guard inside the SELECT already filters
            // against MAX(time_col) in the target
            let sql = format!("INSERT INTO {}\n{}", request.physical, request.select_sql);
            run(client, request, "incremental insert", &sql).await?
        }
        IncrementalStrategy::UniqueKey => return merge_on_key(client, request).await,
    };

    Ok(MaterializeOutcome {
        object: request.physical.to_string(),
        rows_affected: output.rows_affected,
        new_high_watermark: read_high_watermark(client, request).await?,
    })
}

/// First run: create the table outright.
async fn initial_load(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
) -> ExecResult<MaterializeOutcome> {
    let sql = format!(
        "CREATE TABLE {}{} AS\n{}",
        request.physical,
        cluster_clause(request.config),
        request.select_sql
    );
    let output = run(client, request, "incremental initial load", &sql).await?;

    Ok(MaterializeOutcome {
        object: request.physical.to_string(),
        rows_affected: output.rows_affected,
        new_high_watermark: read_high_watermark(client, request).await?,
    })
}

/// MERGE new rows on the unique key through a temporary staging table.
async fn merge_on_key(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
) -> ExecResult<MaterializeOutcome> {
    let keys = request.config.unique_keys();
    if keys.is_empty() {
        return Err(ExecError::StrategyConfig {
            model: request.name.to_string(),
            message: "unique_key strategy requires unique_key".to_string(),
        });
    }

    let staging = format!("{}__incr", request.physical);

    let create_staging = format!(
        "CREATE OR REPLACE TEMPORARY TABLE {} AS\n{}",
        staging, request.select_sql
    );
    run(client, request, "incremental stage", &create_staging).await?;

    let on_clause = keys
        .iter()
        .map(|key| format!("target.{k} = source.{k}", k = key))
        .collect::<Vec<_>>()
        .join(" AND ");
    let merge = format!(
        "MERGE INTO {target} AS target USING {staging} AS source ON {on}\n\
         WHEN MATCHED THEN UPDATE SET *\n\
         WHEN NOT MATCHED THEN INSERT *",
        target = request.physical,
        staging = staging,
        on = on_clause
    );
    let output = run(client, request, "incremental merge", &merge).await?;

    let drop_staging = format!("DROP TABLE IF EXISTS {}", staging);
    if let Err(e) = client.execute(&drop_staging).await {
        log::warn!("failed to drop staging table {}: {}", staging, e);
    }

    Ok(MaterializeOutcome {
        object: request.physical.to_string(),
        rows_affected: output.rows_affected,
        new_high_watermark: None,
    })
}

/// Read back MAX(time_col) as the new high-watermark, when configured.
async fn read_high_watermark(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
) -> ExecResult<Option<String>> {
    let Some(time_column) = &request.config.time_column else {
        return Ok(None);
    };

    let sql = format!(
        "SELECT MAX({}) AS high_watermark FROM {}",
        time_column, request.physical
    );
    let output = run(client, request, "read high-watermark", &sql).await?;
    Ok(output.scalar().and_then(|value| match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }))
}
