//! The plan command (dry-run inspection)

use crate::cli::{GlobalArgs, OutputFormat, PlanArgs};
use crate::context::ProjectContext;
use cascade_core::{ModelName, PlanOptions, Planner};
use std::collections::BTreeSet;

pub fn execute(args: &PlanArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let ctx = ProjectContext::load(global)?;
    let state = ctx.state_store()?;

    let filter: Option<BTreeSet<ModelName>> = if args.models.is_empty() {
        None
    } else {
        Some(crate::commands::run::parse_model_names(&args.models)?)
    };

    let plan = Planner::new(&ctx.registry, &ctx.graph, state.snapshot()).build(&PlanOptions {
        filter,
        forced: BTreeSet::new(),
        include_unchanged: args.show_unchanged,
    })?;

    match args.output {
        OutputFormat::Json => println!("{}", plan.to_json()?),
        OutputFormat::Text => {
            if plan.is_noop() && plan.changes.is_empty() {
                println!("Nothing to do: every model is up to date.");
                return Ok(0);
            }

            println!("Plan for environment '{}':", plan.environment);
            for change in &plan.changes {
                println!("  {:<18} {}", change.reason.to_string(), change.model);
            }
            for name in &plan.deletions {
                println!("  {:<18} {}", "DELETE", name);
            }

            if !plan.batches.is_empty() {
                println!("\nExecution order:");
                for (index, batch) in plan.batches.iter().enumerate() {
                    let names: Vec<&str> = batch.iter().map(|m| m.as_str()).collect();
                    println!("  {}. {}", index + 1, names.join(", "));
                }
            }
        }
    }

    Ok(0)
}
