//! The serve command: poll model fingerprints and re-plan on change
//!
//! The watcher itself (inotify and friends) lives outside the engine; this
//! loop recompiles the registry on an interval and compares fingerprints,
//! which is enough to drive the surface.

use crate::cli::{GlobalArgs, ServeArgs};
use crate::context::ProjectContext;
use cascade_core::{PlanOptions, Planner};
use std::collections::BTreeMap;
use std::time::Duration;

pub async fn execute(args: &ServeArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    if !args.watch {
        println!("serve without --watch plans once and exits.");
        plan_once(global)?;
        return Ok(0);
    }

    let mut fingerprints: BTreeMap<String, String> = BTreeMap::new();
    println!(
        "Watching project (poll every {}s); Ctrl-C to stop.",
        args.interval
    );

    loop {
        match ProjectContext::load(global) {
            Ok(ctx) => {
                let current: BTreeMap<String, String> = ctx
                    .registry
                    .list()
                    .into_iter()
                    .map(|m| (m.name.to_string(), m.fingerprint.clone()))
                    .collect();

                if current != fingerprints {
                    fingerprints = current;
                    if let Err(e) = print_plan(&ctx) {
                        eprintln!("plan failed: {:#}", e);
                    }
                }
            }
            Err(e) => eprintln!("recompile failed: {:#}", e),
        }

        tokio::time::sleep(Duration::from_secs(args.interval.max(1))).await;
    }
}

fn plan_once(global: &GlobalArgs) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(global)?;
    print_plan(&ctx)
}

fn print_plan(ctx: &ProjectContext) -> anyhow::Result<()> {
    let state = ctx.state_store()?;
    let plan =
        Planner::new(&ctx.registry, &ctx.graph, state.snapshot()).build(&PlanOptions::default())?;

    if plan.is_noop() {
        println!("[{}] up to date", plan.environment);
    } else {
        let summary = plan.summary();
        println!(
            "[{}] pending: {} new, {} changed, {} upstream, {} deletions",
            plan.environment,
            summary.new,
            summary.code_changed,
            summary.upstream_changed,
            summary.deletions
        );
        for batch in &plan.batches {
            let names: Vec<&str> = batch.iter().map(|m| m.as_str()).collect();
            println!("    -> {}", names.join(", "));
        }
    }
    Ok(())
}
