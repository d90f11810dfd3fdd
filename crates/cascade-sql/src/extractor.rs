//! Relation extraction from SQL AST
//!
//! Walks parsed statements collecting every referenced relation, filters out
//! CTE names, and classifies placeholder tokens back into the ref/source
//! targets they came from. Bare relations (schema-qualified identifiers not
//! wrapped in `ref`/`source`) are reported as-is so the compiler can match
//! them against known model names.

use sqlparser::ast::{visit_relations, Query, Statement, With};
use std::collections::BTreeSet;
use std::ops::ControlFlow;

/// Placeholder prefix for `ref()` targets (kept in sync with the expander)
const REF_PREFIX: &str = "__REF__";

/// Placeholder prefix for `source()` targets
const SRC_PREFIX: &str = "__SRC__";

/// A referenced relation, classified by where it came from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelationRef {
    /// A `ref()` placeholder carrying the model name
    Ref(String),

    /// A `source()` placeholder carrying group and table
    Source { group: String, table: String },

    /// A literal relation identifier
    Bare(String),
}

/// Classify a relation string into a ref/source placeholder or a bare name.
pub fn classify_relation(name: &str) -> RelationRef {
    if let Some(inner) = name.strip_prefix(REF_PREFIX).and_then(|s| s.strip_suffix("__")) {
        if !inner.is_empty() {
            return RelationRef::Ref(inner.to_string());
        }
    }
    if let Some(inner) = name.strip_prefix(SRC_PREFIX).and_then(|s| s.strip_suffix("__")) {
        if let Some((group, table)) = inner.split_once("__") {
            if !group.is_empty() && !table.is_empty() {
                return RelationRef::Source {
                    group: group.to_string(),
                    table: table.to_string(),
                };
            }
        }
    }
    RelationRef::Bare(name.to_string())
}

/// Extract CTE names from a WITH clause
fn cte_names(with: &With) -> BTreeSet<String> {
    with.cte_tables
        .iter()
        .map(|cte| cte.alias.name.value.clone())
        .collect()
}

/// Extract CTE names declared at the top of a statement
fn statement_cte_names(stmt: &Statement) -> BTreeSet<String> {
    match stmt {
        Statement::Query(query) => query_cte_names(query),
        _ => BTreeSet::new(),
    }
}

fn query_cte_names(query: &Query) -> BTreeSet<String> {
    query.with.as_ref().map(cte_names).unwrap_or_default()
}

/// Extract every referenced relation from a set of statements.
///
/// Relations named after a CTE declared in the same statement set are
/// filtered out (they are internal to the query, not dependencies).
pub fn extract_relations(statements: &[Statement]) -> BTreeSet<String> {
    let all_ctes: BTreeSet<String> = statements.iter().flat_map(statement_cte_names).collect();

    let mut relations = BTreeSet::new();
    for stmt in statements {
        let _ = visit_relations(stmt, |relation| {
            relations.insert(crate::object_name_to_string(relation));
            ControlFlow::<()>::Continue(())
        });
    }

    relations.retain(|rel| {
        let last = rel.split('.').next_back().unwrap_or(rel);
        !all_ctes.contains(last) && !all_ctes.contains(rel.as_str())
    });

    relations
}

/// Extract and classify in one step.
pub fn classify_relations(statements: &[Statement]) -> BTreeSet<RelationRef> {
    extract_relations(statements)
        .into_iter()
        .map(|name| classify_relation(&name))
        .collect()
}

#[cfg(test)]
#[path = "extractor_test.rs"]
mod tests;
