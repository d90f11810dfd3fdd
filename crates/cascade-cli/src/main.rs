//! Cascade CLI - compile, plan, and run SQL transformation projects

use clap::Parser;

mod cli;
mod commands;
mod context;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Run(args) => commands::run::execute(args, &cli.global).await,
        Commands::RunAll(args) => commands::run::execute_all(args, &cli.global).await,
        Commands::Plan(args) => commands::plan::execute(args, &cli.global),
        Commands::Validate => commands::validate::execute(&cli.global),
        Commands::Test(args) => commands::test::execute(args, &cli.global).await,
        Commands::List(args) => commands::list::execute(args, &cli.global),
        Commands::Deps(args) => commands::deps::execute(args, &cli.global),
        Commands::Lineage(args) => commands::lineage::execute(args, &cli.global),
        Commands::Backfill(args) => commands::backfill::execute(args, &cli.global).await,
        Commands::Serve(args) => commands::serve::execute(args, &cli.global).await,
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Configuration and compile problems exit 2
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}
