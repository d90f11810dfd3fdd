//! Model and compiled-model representations

use crate::checksum::fingerprint;
use crate::config::ModelConfig;
use crate::model_name::ModelName;
use crate::schema::ModelSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A registered model: one SQL transformation, uniquely named.
///
/// Models are mutated only by full re-registration; the registry replaces
/// them wholesale and never edits one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Dotted model name derived from the file path
    pub name: ModelName,

    /// Path of the source file, relative to the models root
    pub path: PathBuf,

    /// Raw SQL text (templates unexpanded)
    pub raw_sql: String,

    /// Stable content hash over raw SQL + sorted config map
    pub fingerprint: String,

    /// Effective configuration (comment merged over schema YAML)
    #[serde(default)]
    pub config: ModelConfig,

    /// Explicit extra dependencies from the `-- depends_on:` header
    #[serde(default)]
    pub extra_deps: BTreeSet<ModelName>,

    /// Schema metadata from schema.yml, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<ModelSchema>,
}

impl Model {
    /// Recompute the fingerprint from the current raw SQL and config.
    pub fn compute_fingerprint(raw_sql: &str, config: &ModelConfig) -> String {
        fingerprint(raw_sql, &config.raw)
    }
}

/// A reference to an external source table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub group: String,
    pub table: String,
}

impl SourceRef {
    pub fn new(group: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.group, self.table)
    }
}

/// One upstream contributor to an output column
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnOrigin {
    /// Upstream relation (model name, source, or bare identifier)
    pub relation: String,
    /// Upstream column; `"*"` marks an unexpanded wildcard edge
    pub column: String,
}

impl std::fmt::Display for ColumnOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.relation, self.column)
    }
}

/// Per-output-column lineage: output column -> contributing origins
pub type Lineage = BTreeMap<String, BTreeSet<ColumnOrigin>>;

/// The compiler's product for one model: expanded SQL plus everything the
/// planner and executor need to know about it.
///
/// Recomputed whenever the underlying model's fingerprint changes; the
/// registry drops stale entries on re-registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedModel {
    /// Model name
    pub name: ModelName,

    /// Fingerprint of the Model this was compiled from
    pub fingerprint: String,

    /// Expanded SQL with `__REF__`/`__SRC__`/`__THIS__` placeholders intact
    pub expanded_sql: String,

    /// Model dependencies (ref targets, bare matches, and explicit extras)
    pub depends_on: BTreeSet<ModelName>,

    /// External source references
    pub sources: BTreeSet<SourceRef>,

    /// `$variables` referenced by the SQL
    pub variables: BTreeSet<String>,

    /// Effective configuration at compile time
    pub config: ModelConfig,

    /// Per-output-column lineage (empty when analysis degraded)
    #[serde(default)]
    pub lineage: Lineage,

    /// Non-fatal compile warnings (parse/lineage degradation)
    #[serde(default)]
    pub warnings: Vec<String>,
}
