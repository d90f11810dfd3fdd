//! The validate command

use crate::cli::GlobalArgs;
use crate::context::ProjectContext;

pub fn execute(global: &GlobalArgs) -> anyhow::Result<i32> {
    // Loading compiles every model, resolves refs/sources, and builds the
    // graph; any configuration or compile problem surfaces as an error (exit 2)
    let ctx = ProjectContext::load(global)?;

    for warning in &ctx.warnings {
        println!("  warning: {}", warning);
    }

    println!(
        "Project '{}' is valid: {} models, {} source groups, {} warnings",
        ctx.config.name,
        ctx.registry.len(),
        ctx.catalog.len(),
        ctx.warnings.len()
    );
    Ok(0)
}
