//! The backfill command: replay an incremental model over a date range

use crate::cli::{BackfillArgs, GlobalArgs};
use crate::context::ProjectContext;
use anyhow::{bail, Context as _};
use cascade_core::ModelName;
use cascade_exec::{run_backfill, BackfillOptions};
use chrono::NaiveDate;

pub async fn execute(args: &BackfillArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let Some(model) = ModelName::try_new(args.model.as_str()) else {
        bail!("invalid model name '{}'", args.model);
    };

    let start = parse_date(&args.start).context("parsing --start")?;
    let end = parse_date(&args.end).context("parsing --end")?;
    if start > end {
        bail!("--start {} is after --end {}", start, end);
    }

    let ctx = ProjectContext::load(global)?;
    let state = ctx.state_store()?;
    let client = ctx.client()?;
    let options = ctx.executor_options(&args.vars, false)?;

    println!(
        "Backfilling {} from {} to {} ({} day windows)",
        model, start, end, args.interval_days
    );

    let (summary, _state) = run_backfill(
        &client,
        &ctx.registry,
        &ctx.catalog,
        &ctx.graph,
        &model,
        state,
        &options,
        &BackfillOptions {
            start,
            end,
            interval_days: args.interval_days,
        },
    )
    .await?;
    client.pool().close_all().await;

    for (window, run) in &summary.windows {
        if run.failed() > 0 {
            let detail = run
                .results
                .iter()
                .find_map(|r| r.error.as_ref())
                .map(|c| c.to_string())
                .unwrap_or_default();
            println!("  \u{2717} {} - {}", window, detail);
        } else {
            println!("  \u{2713} {}", window);
        }
    }
    println!(
        "Backfill complete: {} windows, {} failed",
        summary.windows.len(),
        summary.failed_windows()
    );

    Ok(summary.exit_code())
}

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("'{}' is not a YYYY-MM-DD date: {}", value, e))
}
