//! cascade-sql - SQL AST analysis for Cascade
//!
//! Wraps sqlparser (Snowflake dialect) to extract referenced relations and
//! per-output-column lineage from expanded model SQL. Parse failures degrade
//! gracefully: the analysis records a warning and the SQL still runs.

pub mod analysis;
pub mod error;
pub mod extractor;
pub mod lineage;
pub mod parser;

pub use analysis::{analyze, SqlAnalysis};
pub use error::{SqlError, SqlResult};
pub use extractor::{classify_relation, extract_relations, RelationRef};
pub use lineage::{ColumnLineage, ColumnRef, ModelLineage};
pub use parser::SqlParser;

use sqlparser::ast::ObjectName;

/// Convert an ObjectName to a dotted string
pub fn object_name_to_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}
