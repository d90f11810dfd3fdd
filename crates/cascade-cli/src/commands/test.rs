//! The test command: schema-declared data quality tests

use crate::cli::{GlobalArgs, TestArgs};
use crate::context::ProjectContext;
use cascade_core::SchemaTest;
use cascade_exec::Resolver;

pub async fn execute(args: &TestArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let ctx = ProjectContext::load(global)?;

    let selected = if args.models.is_empty() {
        None
    } else {
        Some(crate::commands::run::parse_model_names(&args.models)?)
    };

    let mut tests: Vec<SchemaTest> = Vec::new();
    for model in ctx.registry.list() {
        if let Some(filter) = &selected {
            if !filter.contains(&model.name) {
                continue;
            }
        }
        if let Some(schema) = &model.schema {
            tests.extend(schema.extract_tests(&model.name));
        }
    }

    if tests.is_empty() {
        println!("No tests to run.");
        return Ok(0);
    }

    let client = ctx.client()?;
    let resolver = Resolver::new(
        &ctx.registry,
        &ctx.catalog,
        ctx.config.connection.database.as_deref(),
        ctx.config.connection.schema.as_deref(),
    );

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut errored = 0usize;

    for test in &tests {
        let physical = match resolver.model_identifier(&test.model) {
            Ok(physical) => physical,
            Err(e) => {
                println!("  ? {} - {}", test.display_name(), e);
                errored += 1;
                continue;
            }
        };
        let sql = test.to_sql(&physical);

        match client.execute(&sql).await {
            Ok(output) => {
                let failures = match output.scalar() {
                    Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
                    Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
                    _ => 0,
                };
                if failures == 0 {
                    println!("  \u{2713} {}", test.display_name());
                    passed += 1;
                } else {
                    println!("  \u{2717} {} ({} failing rows)", test.display_name(), failures);
                    failed += 1;
                }
            }
            Err(e) => {
                println!("  ? {} - {}", test.display_name(), e);
                errored += 1;
            }
        }
    }

    client.pool().close_all().await;

    println!(
        "Tests: {} passed, {} failed, {} errors",
        passed, failed, errored
    );
    Ok(if failed > 0 || errored > 0 { 1 } else { 0 })
}
