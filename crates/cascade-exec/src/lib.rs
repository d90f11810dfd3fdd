//! cascade-exec - Execution runtime for Cascade
//!
//! Turns a plan into warehouse work: variable substitution, placeholder
//! resolution, per-kind materialisation strategies (including incremental
//! sub-strategies and retirement-pattern CDC), the partial-failure-tolerant
//! batch executor, and date-range backfill over incremental models.

pub mod backfill;
pub mod cdc;
pub mod error;
pub mod executor;
pub mod incremental;
pub mod materialize;
pub mod resolve;
pub mod vars;

pub use backfill::{run_backfill, BackfillOptions, BackfillSummary, BackfillWindow};
pub use error::{ErrorContext, ExecError, ExecResult};
pub use executor::{ExecutionResult, Executor, ExecutorOptions, RunSummary};
pub use materialize::{materialise, MaterializeOutcome, MaterializeRequest};
pub use resolve::Resolver;
pub use vars::{format_value, substitute_variables};
