//! The run and run-all commands

use crate::cli::{GlobalArgs, OutputFormat, RunAllArgs, RunArgs};
use crate::context::ProjectContext;
use cascade_core::{ModelName, Plan, PlanOptions, Planner, RunStatus};
use cascade_exec::{Executor, RunSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::time::Duration;

pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let filter = parse_model_names(&args.models)?;
    run_plan(
        global,
        Some(filter),
        args.force,
        args.fail_fast,
        &args.vars,
        args.output,
    )
    .await
}

/// Parse user-supplied model names, rejecting malformed ones up front.
pub(crate) fn parse_model_names(names: &[String]) -> anyhow::Result<BTreeSet<ModelName>> {
    let mut parsed = BTreeSet::new();
    for name in names {
        match ModelName::try_new(name.as_str()) {
            Some(model) => {
                parsed.insert(model);
            }
            None => anyhow::bail!("invalid model name '{}'", name),
        }
    }
    Ok(parsed)
}

pub async fn execute_all(args: &RunAllArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    run_plan(
        global,
        None,
        args.force,
        args.fail_fast,
        &args.vars,
        args.output,
    )
    .await
}

async fn run_plan(
    global: &GlobalArgs,
    filter: Option<BTreeSet<ModelName>>,
    force: bool,
    fail_fast: bool,
    vars: &[String],
    output: OutputFormat,
) -> anyhow::Result<i32> {
    let ctx = ProjectContext::load(global)?;
    let state = ctx.state_store()?;

    let forced: BTreeSet<ModelName> = if force {
        filter.clone().unwrap_or_else(|| ctx.registry.names())
    } else {
        BTreeSet::new()
    };

    let plan = Planner::new(&ctx.registry, &ctx.graph, state.snapshot()).build(&PlanOptions {
        filter,
        forced,
        include_unchanged: false,
    })?;

    if plan.is_noop() {
        if output == OutputFormat::Text {
            println!("Nothing to do: every model is up to date.");
        }
        return Ok(0);
    }

    if output == OutputFormat::Text {
        print_plan_header(&plan);
    }

    let client = ctx.client()?;
    let options = ctx.executor_options(vars, fail_fast)?;
    let executor = Executor::new(client.clone(), &ctx.registry, &ctx.catalog, options);

    let spinner = if output == OutputFormat::Text {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("static spinner template is valid"),
        );
        pb.set_message(format!(
            "Executing {} models in {} batches...",
            plan.models_to_execute().len(),
            plan.batches.len()
        ));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let (summary, _state) = executor.run(&plan, state).await?;
    client.pool().close_all().await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    match output {
        OutputFormat::Text => print_summary(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(summary.exit_code())
}

fn print_plan_header(plan: &Plan) {
    let summary = plan.summary();
    println!(
        "Plan: {} new, {} changed, {} upstream, {} forced, {} to delete",
        summary.new,
        summary.code_changed,
        summary.upstream_changed,
        summary.forced,
        summary.deletions
    );
}

fn print_summary(summary: &RunSummary) {
    for result in &summary.results {
        match result.status {
            RunStatus::Success => {
                let duration = result
                    .finished_at
                    .signed_duration_since(result.started_at)
                    .num_milliseconds();
                match &result.rows_affected {
                    Some(rows) => println!(
                        "  \u{2713} {} ({} rows) [{}ms]",
                        result.model, rows, duration
                    ),
                    None => println!("  \u{2713} {} [{}ms]", result.model, duration),
                }
            }
            RunStatus::Failed => {
                let detail = result
                    .error
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                println!("  \u{2717} {} - {}", result.model, detail);
            }
            RunStatus::Skipped => {
                println!("  - {} (skipped: upstream failure)", result.model);
            }
        }
    }

    for name in &summary.deleted_objects {
        println!("  \u{2713} dropped {}", name);
    }

    if summary.cancelled {
        println!("Run cancelled.");
    }
    println!(
        "Done: {} succeeded, {} failed, {} skipped",
        summary.succeeded(),
        summary.failed(),
        summary.skipped()
    );
}
