//! Change-data-capture materialisation with the retirement pattern
//!
//! The change stream carries `__CDC_OPERATION` (I/U/D/E) and
//! `__CDC_TIMESTAMP` columns; the target table carries an extra
//! `obsolete_date` column. Semantics per event:
//!
//! - **I**: insert the row with `obsolete_date = NULL`.
//! - **U**: retire the current row (`obsolete_date = now` where the key
//!   matches and `obsolete_date IS NULL`), then insert the new row active.
//! - **D**/**E**: retire the current row and insert the event row already
//!   retired, preserving the delete in history.
//!
//! Identical duplicate events are dropped; a key's remaining events are
//! applied in `__CDC_TIMESTAMP` order, wave by wave, so one run can absorb a
//! full I/U/D history for a key. Retirements are batched 1000 keys per
//! UPDATE; inserts go out as 1000-row VALUES batches, or through the
//! driver's bulk path on the chunked route. Change sets above one million
//! rows are split into ~10M-row chunks processed with bounded parallelism;
//! chunk boundaries follow the key range when the key is numeric so one
//! key's events never straddle chunks.

use crate::error::{ErrorContext, ExecError, ExecResult};
use crate::materialize::{
    cluster_clause, relation_exists, run, scalar_to_usize, MaterializeOutcome, MaterializeRequest,
};
use crate::vars::format_value;
use cascade_db::{DbError, QueryOutput, WarehouseClient};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const OPERATION_COLUMN: &str = "__CDC_OPERATION";
const TIMESTAMP_COLUMN: &str = "__CDC_TIMESTAMP";
const OBSOLETE_COLUMN: &str = "obsolete_date";

/// Keys per UPDATE statement and rows per VALUES batch
const STATEMENT_BATCH: usize = 1000;

/// Change sets above this size take the chunked path
const CHUNK_THRESHOLD: usize = 1_000_000;

/// Rows per chunk on the chunked path
const CHUNK_ROWS: usize = 10_000_000;

/// Parallel chunk workers (shares the main pool)
const MAX_PARALLEL_CHUNKS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CdcStats {
    pub inserted: usize,
    pub updated: usize,
    pub retired: usize,
    pub deleted: usize,
}

impl CdcStats {
    fn merge(&mut self, other: CdcStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.retired += other.retired;
        self.deleted += other.deleted;
    }

    fn total(&self) -> usize {
        self.inserted + self.updated + self.retired + self.deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CdcOp {
    Insert,
    Update,
    Delete,
    Expired,
}

impl CdcOp {
    fn parse(value: Option<&Value>) -> CdcOp {
        match value {
            Some(Value::String(s)) => match s.trim().to_ascii_uppercase().as_str() {
                "I" => CdcOp::Insert,
                "D" => CdcOp::Delete,
                "E" => CdcOp::Expired,
                _ => CdcOp::Update,
            },
            // Missing operation defaults to update, matching COALESCE(op, 'U')
            _ => CdcOp::Update,
        }
    }

    fn retires(&self) -> bool {
        !matches!(self, CdcOp::Insert)
    }

    fn tombstone(&self) -> bool {
        matches!(self, CdcOp::Delete | CdcOp::Expired)
    }
}

struct CdcEvent {
    key_literal: String,
    timestamp: String,
    op: CdcOp,
    row: Vec<Value>,
}

/// Owned per-run context so chunk workers can run as tasks.
#[derive(Clone)]
struct CdcContext {
    client: WarehouseClient,
    model: String,
    physical: String,
    key: String,
    use_bulk: bool,
}

pub(crate) async fn execute_cdc(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
) -> ExecResult<MaterializeOutcome> {
    let keys = request.config.unique_keys();
    if keys.len() != 1 {
        return Err(ExecError::StrategyConfig {
            model: request.name.to_string(),
            message: "cdc materialization requires exactly one unique_key column".to_string(),
        });
    }
    let key = keys[0].clone();

    if !relation_exists(client, request).await? {
        create_target(client, request, &key).await?;
    }

    let staging = format!("{}__changes", request.physical);
    let create_staging = format!(
        "CREATE OR REPLACE TEMPORARY TABLE {} AS\n{}",
        staging, request.select_sql
    );
    run(client, request, "cdc stage", &create_staging).await?;

    let count_sql = format!("SELECT COUNT(*) AS cnt FROM {}", staging);
    let count_output = run(client, request, "cdc count", &count_sql).await?;
    let total_rows = scalar_to_usize(count_output.scalar());

    if total_rows == 0 {
        drop_staging(client, &staging).await;
        return Ok(MaterializeOutcome {
            object: request.physical.to_string(),
            rows_affected: Some(0),
            new_high_watermark: None,
        });
    }

    let context = CdcContext {
        client: client.clone(),
        model: request.name.to_string(),
        physical: request.physical.to_string(),
        key: key.clone(),
        use_bulk: total_rows > CHUNK_THRESHOLD,
    };

    let stats = if total_rows > CHUNK_THRESHOLD {
        process_chunked(&context, &staging, total_rows).await
    } else {
        let fetch_sql = format!("SELECT * FROM {}", staging);
        match context.execute("cdc fetch", &fetch_sql).await {
            Ok(output) => context.apply_change_set(output.columns, output.rows).await,
            Err(e) => Err(e),
        }
    };

    drop_staging(client, &staging).await;
    let stats = stats?;

    log::debug!(
        "cdc {}: {} inserted, {} updated, {} retired, {} deleted",
        request.name,
        stats.inserted,
        stats.updated,
        stats.retired,
        stats.deleted
    );

    Ok(MaterializeOutcome {
        object: request.physical.to_string(),
        rows_affected: Some(stats.total()),
        new_high_watermark: None,
    })
}

/// First run: create an empty target with the stream's columns plus the
/// retirement column, clustered on the key.
async fn create_target(
    client: &WarehouseClient,
    request: &MaterializeRequest<'_>,
    key: &str,
) -> ExecResult<()> {
    let cluster = if request.config.cluster_by.is_empty() {
        format!(" CLUSTER BY ({})", key)
    } else {
        cluster_clause(request.config)
    };

    let sql = format!(
        "CREATE TABLE {}{} AS\nSELECT *, CAST(NULL AS TIMESTAMP_NTZ) AS {} FROM ({}) LIMIT 0",
        request.physical, cluster, OBSOLETE_COLUMN, request.select_sql
    );
    run(client, request, "cdc create target", &sql).await?;
    Ok(())
}

async fn drop_staging(client: &WarehouseClient, staging: &str) {
    let sql = format!("DROP TABLE IF EXISTS {}", staging);
    if let Err(e) = client.execute(&sql).await {
        log::warn!("failed to drop cdc staging table {}: {}", staging, e);
    }
}

/// Chunked path for very large change sets: pick boundaries, fan out to at
/// most `MAX_PARALLEL_CHUNKS` workers sharing the pool.
async fn process_chunked(
    context: &CdcContext,
    staging: &str,
    total_rows: usize,
) -> ExecResult<CdcStats> {
    let chunk_count = total_rows.div_ceil(CHUNK_ROWS);
    let chunk_sqls = chunk_statements(context, staging, total_rows, chunk_count).await?;

    let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_CHUNKS));
    let mut tasks: JoinSet<ExecResult<CdcStats>> = JoinSet::new();

    for fetch_sql in chunk_sqls {
        let context = context.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return Ok(CdcStats::default());
            };
            let output = context.execute("cdc fetch chunk", &fetch_sql).await?;
            context.apply_change_set(output.columns, output.rows).await
        });
    }

    let mut stats = CdcStats::default();
    let mut first_error: Option<ExecError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(chunk_stats)) => stats.merge(chunk_stats),
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(ExecError::ModelExecutionFailure {
                        model: context.model.clone(),
                        context: ErrorContext::new("cdc chunk join")
                            .with_model(&context.model)
                            .with_driver_error(&e),
                    });
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

/// Build per-chunk fetch statements. A numeric key yields key-range chunks
/// (keeping each key's events in one chunk); otherwise chunks follow
/// arrival order.
async fn chunk_statements(
    context: &CdcContext,
    staging: &str,
    total_rows: usize,
    chunk_count: usize,
) -> ExecResult<Vec<String>> {
    let bounds_sql = format!(
        "SELECT MIN({k}) AS lo, MAX({k}) AS hi FROM {staging}",
        k = context.key,
        staging = staging
    );
    let bounds = context.execute("cdc key bounds", &bounds_sql).await?;

    let numeric_bounds = bounds.rows.first().and_then(|row| {
        match (row.first(), row.get(1)) {
            (Some(Value::Number(lo)), Some(Value::Number(hi))) => {
                Some((lo.as_f64()?, hi.as_f64()?))
            }
            _ => None,
        }
    });

    let mut statements = Vec::with_capacity(chunk_count);
    match numeric_bounds {
        Some((lo, hi)) if hi > lo => {
            let width = (hi - lo) / chunk_count as f64;
            for i in 0..chunk_count {
                let from = lo + width * i as f64;
                let clause = if i + 1 == chunk_count {
                    format!("{k} >= {from} AND {k} <= {hi}", k = context.key)
                } else {
                    let to = lo + width * (i + 1) as f64;
                    format!("{k} >= {from} AND {k} < {to}", k = context.key)
                };
                statements.push(format!("SELECT * FROM {} WHERE {}", staging, clause));
            }
        }
        _ => {
            let mut offset = 0;
            while offset < total_rows {
                statements.push(format!(
                    "SELECT * FROM {} LIMIT {} OFFSET {}",
                    staging, CHUNK_ROWS, offset
                ));
                offset += CHUNK_ROWS;
            }
        }
    }
    Ok(statements)
}

impl CdcContext {
    fn failure(&self, operation: &str, sql: &str, error: DbError) -> ExecError {
        ExecError::ModelExecutionFailure {
            model: self.model.clone(),
            context: ErrorContext::new(operation)
                .with_model(&self.model)
                .with_sql(sql)
                .with_driver_error(&error),
        }
    }

    async fn execute(&self, operation: &str, sql: &str) -> ExecResult<QueryOutput> {
        self.client
            .execute(sql)
            .await
            .map_err(|e| self.failure(operation, sql, e))
    }

    /// Apply one change set against the target with the retirement pattern.
    async fn apply_change_set(
        &self,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> ExecResult<CdcStats> {
        let key_idx = columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(&self.key))
            .ok_or_else(|| ExecError::StrategyConfig {
                model: self.model.clone(),
                message: format!("change stream is missing the unique key column '{}'", self.key),
            })?;
        let op_idx = columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(OPERATION_COLUMN))
            .ok_or_else(|| ExecError::StrategyConfig {
                model: self.model.clone(),
                message: format!("change stream is missing '{}'", OPERATION_COLUMN),
            })?;
        let ts_idx = columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(TIMESTAMP_COLUMN));

        // Decode events, dropping exact duplicates (same key, timestamp, op)
        let mut seen: HashSet<(String, String, u8)> = HashSet::new();
        let mut queues: BTreeMap<String, Vec<CdcEvent>> = BTreeMap::new();
        for row in rows {
            let key_literal = format_value(row.get(key_idx).unwrap_or(&Value::Null));
            let op = CdcOp::parse(row.get(op_idx));
            let timestamp = match ts_idx.and_then(|idx| row.get(idx)) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            if !seen.insert((key_literal.clone(), timestamp.clone(), op as u8)) {
                continue;
            }
            queues.entry(key_literal.clone()).or_default().push(CdcEvent {
                key_literal,
                timestamp,
                op,
                row,
            });
        }

        // Each key's events apply in timestamp order
        for events in queues.values_mut() {
            events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        }

        let insert_columns: Vec<String> = columns
            .iter()
            .cloned()
            .chain(std::iter::once(OBSOLETE_COLUMN.to_string()))
            .collect();

        let mut stats = CdcStats::default();
        let mut wave = 0;
        loop {
            let mut retire_keys: Vec<String> = Vec::new();
            let mut inserts: Vec<(&CdcEvent, bool)> = Vec::new();

            for events in queues.values() {
                let Some(event) = events.get(wave) else {
                    continue;
                };
                if event.op.retires() {
                    retire_keys.push(event.key_literal.clone());
                }
                inserts.push((event, event.op.tombstone()));
                match event.op {
                    CdcOp::Insert => stats.inserted += 1,
                    CdcOp::Update => stats.updated += 1,
                    CdcOp::Delete | CdcOp::Expired => stats.deleted += 1,
                }
            }

            if inserts.is_empty() && retire_keys.is_empty() {
                break;
            }

            // Retire the current rows first so the fresh rows stay active
            for batch in retire_keys.chunks(STATEMENT_BATCH) {
                let sql = format!(
                    "UPDATE {} SET {} = CURRENT_TIMESTAMP() WHERE {} IN ({}) AND {} IS NULL",
                    self.physical,
                    OBSOLETE_COLUMN,
                    self.key,
                    batch.join(", "),
                    OBSOLETE_COLUMN
                );
                self.execute("cdc retire", &sql).await?;
                stats.retired += batch.len();
            }

            self.insert_rows(&insert_columns, &inserts).await?;
            wave += 1;
        }

        Ok(stats)
    }

    /// Insert event rows: active rows get `obsolete_date = NULL`, tombstones
    /// keep their event timestamp.
    async fn insert_rows(
        &self,
        insert_columns: &[String],
        inserts: &[(&CdcEvent, bool)],
    ) -> ExecResult<()> {
        if inserts.is_empty() {
            return Ok(());
        }

        if self.use_bulk {
            let rows: Vec<Vec<Value>> = inserts
                .iter()
                .map(|(event, tombstone)| {
                    let mut row = event.row.clone();
                    row.push(if *tombstone {
                        Value::String(event.timestamp.clone())
                    } else {
                        Value::Null
                    });
                    row
                })
                .collect();
            self.client
                .bulk_insert(&self.physical, insert_columns, rows)
                .await
                .map_err(|e| self.failure("cdc bulk insert", &self.physical, e))?;
            return Ok(());
        }

        for batch in inserts.chunks(STATEMENT_BATCH) {
            let values: Vec<String> = batch
                .iter()
                .map(|(event, tombstone)| {
                    let mut cells: Vec<String> = event.row.iter().map(format_value).collect();
                    cells.push(if *tombstone {
                        if event.timestamp.is_empty() {
                            "CURRENT_TIMESTAMP()".to_string()
                        } else {
                            format!("'{}'", event.timestamp.replace('\'', "''"))
                        }
                    } else {
                        "NULL".to_string()
                    });
                    format!("({})", cells.join(", "))
                })
                .collect();

            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.physical,
                insert_columns.join(", "),
                values.join(", ")
            );
            self.execute("cdc insert", &sql).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "cdc_test.rs"]
mod tests;
