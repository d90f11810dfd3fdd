//! cascade-core - Core library for Cascade
//!
//! This crate provides the model registry, configuration types, sources
//! catalogue, dependency graph, state store, and planner shared across all
//! Cascade components.

pub mod checksum;
pub mod compile;
pub mod config;
pub mod dag;
pub mod error;
pub mod model;
pub mod model_name;
pub mod plan;
pub mod registry;
pub mod schema;
pub mod sources;
pub mod state;

pub use checksum::{compute_checksum, fingerprint};
pub use compile::{compile_all, compile_model, CompileReport};
pub use config::{
    IncrementalStrategy, Materialization, ModelConfig, OnSchemaChange, ProjectConfig,
};
pub use dag::DependencyGraph;
pub use error::{CoreError, CoreResult};
pub use model::{ColumnOrigin, Model, ParsedModel, SourceRef};
pub use model_name::ModelName;
pub use plan::{ChangeReason, ModelChange, Plan, PlanOptions, Planner};
pub use registry::ModelRegistry;
pub use schema::{ModelSchema, SchemaTest, TestKind};
pub use sources::SourceCatalog;
pub use state::{RunStatus, StateEntry, StateSnapshot, StateStore};
