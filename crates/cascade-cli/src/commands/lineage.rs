//! The lineage command

use crate::cli::{GlobalArgs, LineageArgs};
use crate::context::ProjectContext;
use anyhow::bail;

pub fn execute(args: &LineageArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let ctx = ProjectContext::load(global)?;

    let Some(parsed) = ctx.registry.parsed(&args.model) else {
        bail!("model '{}' not found", args.model);
    };

    println!("Lineage for {}:", parsed.name);
    if parsed.lineage.is_empty() {
        println!("  (no column lineage available)");
        for warning in &parsed.warnings {
            println!("  warning: {}", warning);
        }
        return Ok(0);
    }

    for (output, origins) in &parsed.lineage {
        if origins.is_empty() {
            println!("  {} <- (literal)", output);
            continue;
        }
        let sources: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
        println!("  {} <- {}", output, sources.join(", "));
    }

    Ok(0)
}
