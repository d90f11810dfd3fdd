//! The list command

use crate::cli::{GlobalArgs, ListArgs, OutputFormat};
use crate::context::ProjectContext;

pub fn execute(args: &ListArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let ctx = ProjectContext::load(global)?;

    match args.output {
        OutputFormat::Json => {
            let listing: Vec<serde_json::Value> = ctx
                .registry
                .list()
                .into_iter()
                .map(|model| {
                    serde_json::json!({
                        "name": model.name,
                        "path": model.path,
                        "materialized": model.config.materialized.to_string(),
                        "tags": model.config.tags,
                        "enabled": model.config.enabled,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        OutputFormat::Text => {
            for model in ctx.registry.list() {
                let tags = if model.config.tags.is_empty() {
                    String::new()
                } else {
                    format!("  [{}]", model.config.tags.join(", "))
                };
                println!(
                    "{:<40} {}{}",
                    model.name.as_str(),
                    model.config.materialized,
                    tags
                );
            }
        }
    }

    Ok(0)
}
