//! CLI argument definitions using the clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Cascade - SQL-driven data transformation engine
#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Target environment (overrides cascade.yml)
    #[arg(short, long, global = true)]
    pub target: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan and execute the named models (plus stale dependencies)
    Run(RunArgs),

    /// Plan and execute every model in the project
    RunAll(RunAllArgs),

    /// Show what would change without executing anything
    Plan(PlanArgs),

    /// Compile the project and report problems without running
    Validate,

    /// Run schema tests against materialised models
    Test(TestArgs),

    /// List models and their configuration
    List(ListArgs),

    /// Show the dependency graph
    Deps(DepsArgs),

    /// Show column-level lineage for a model
    Lineage(LineageArgs),

    /// Replay an incremental model over a date range
    Backfill(BackfillArgs),

    /// Watch the project and re-plan when models change
    Serve(ServeArgs),
}

/// Output formats for machine-readable command output
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    #[default]
    Text,
    /// Machine-readable JSON output
    Json,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Models to run
    #[arg(required = true)]
    pub models: Vec<String>,

    /// Execute the selected models even when unchanged
    #[arg(short, long)]
    pub force: bool,

    /// Stop at the first failed model
    #[arg(long)]
    pub fail_fast: bool,

    /// Variable bindings as name=value (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the run-all command
#[derive(Args, Debug)]
pub struct RunAllArgs {
    /// Execute every model even when unchanged
    #[arg(short, long)]
    pub force: bool,

    /// Stop at the first failed model
    #[arg(long)]
    pub fail_fast: bool,

    /// Variable bindings as name=value (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Restrict the plan to these models (default: whole project)
    pub models: Vec<String>,

    /// Include UNCHANGED models in the listing
    #[arg(long)]
    pub show_unchanged: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the test command
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Restrict tests to these models (default: all)
    pub models: Vec<String>,
}

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Dependency graph output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepsFormat {
    /// Indented text listing
    #[default]
    Text,
    /// Graphviz DOT
    Dot,
}

/// Arguments for the deps command
#[derive(Args, Debug)]
pub struct DepsArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: DepsFormat,
}

/// Arguments for the lineage command
#[derive(Args, Debug)]
pub struct LineageArgs {
    /// Model to inspect
    pub model: String,
}

/// Arguments for the backfill command
#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Model to replay
    pub model: String,

    /// First day of the range (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub start: String,

    /// Last day of the range (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub end: String,

    /// Days each window reaches beyond its start
    #[arg(long, default_value_t = 1)]
    pub interval_days: u32,

    /// Extra variable bindings as name=value (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Keep watching and re-planning as fingerprints change
    #[arg(long)]
    pub watch: bool,

    /// Poll interval in seconds
    #[arg(long, default_value_t = 5)]
    pub interval: u64,
}
