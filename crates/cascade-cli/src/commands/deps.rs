//! The deps command

use crate::cli::{DepsArgs, DepsFormat, GlobalArgs};
use crate::context::ProjectContext;

pub fn execute(args: &DepsArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let ctx = ProjectContext::load(global)?;

    match args.format {
        DepsFormat::Dot => println!("{}", ctx.graph.to_dot()),
        DepsFormat::Text => {
            for name in ctx.graph.names() {
                println!("{}", name);
                for dep in ctx.graph.dependencies(name.as_str()) {
                    println!("  <- {}", dep);
                }
            }
        }
    }

    Ok(0)
}
