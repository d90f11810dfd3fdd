//! The model compiler: template expansion, AST analysis, dependency and
//! lineage extraction.
//!
//! Compile-time expansion runs with `is_incremental = false` and the
//! physical identifier unresolved; both `{% if %}` branches contribute to
//! the dependency sets, so a model's dependencies do not flip between first
//! and incremental runs.

use crate::dag::DependencyGraph;
use crate::error::{CoreError, CoreResult};
use crate::model::{ColumnOrigin, Lineage, Model, ParsedModel, SourceRef};
use crate::model_name::ModelName;
use crate::registry::ModelRegistry;
use crate::sources::SourceCatalog;
use cascade_sql::{analyze, RelationRef};
use cascade_template::{expand, ExpandContext};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Output of compiling a whole registry
#[derive(Debug)]
pub struct CompileReport {
    /// Dependency graph over all registered models
    pub graph: DependencyGraph,

    /// Non-fatal warnings gathered across models
    pub warnings: Vec<String>,
}

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("static variable regex is valid")
    })
}

/// `$variables` referenced by a SQL string.
pub fn referenced_variables(sql: &str) -> BTreeSet<String> {
    variable_regex()
        .captures_iter(sql)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Compile a single model into its `ParsedModel` artefact.
///
/// Fails on template errors, refs to unknown models, and source references
/// missing from the catalogue. AST-level failures degrade to warnings.
pub fn compile_model(
    model: &Model,
    registry: &ModelRegistry,
    catalog: &SourceCatalog,
) -> CoreResult<ParsedModel> {
    let expansion = expand(&model.raw_sql, &ExpandContext::default()).map_err(|source| {
        CoreError::Template {
            model: model.name.to_string(),
            source,
        }
    })?;

    let analysis = analyze(&expansion.sql, model.name.as_str());

    let mut depends_on: BTreeSet<ModelName> = BTreeSet::new();
    let mut sources: BTreeSet<SourceRef> = BTreeSet::new();

    for name in &expansion.refs {
        // A ref target that is not even a well-formed name cannot resolve
        let target = ModelName::try_new(name.clone()).ok_or_else(|| {
            CoreError::UnknownReference {
                model: model.name.to_string(),
                target: name.clone(),
            }
        })?;
        depends_on.insert(target);
    }
    for (group, table) in &expansion.sources {
        sources.insert(SourceRef::new(group.clone(), table.clone()));
    }
    for dep in &model.extra_deps {
        depends_on.insert(dep.clone());
    }

    // Bare relations that resolve to a registered model count as
    // dependencies (backward-compatible shortcut for unwrapped references)
    for relation in &analysis.relations {
        match relation {
            RelationRef::Ref(name) => {
                let target = ModelName::try_new(name.clone()).ok_or_else(|| {
                    CoreError::UnknownReference {
                        model: model.name.to_string(),
                        target: name.clone(),
                    }
                })?;
                depends_on.insert(target);
            }
            RelationRef::Source { group, table } => {
                sources.insert(SourceRef::new(group.clone(), table.clone()));
            }
            RelationRef::Bare(name) => {
                // Registered names are well-formed by construction
                if registry.contains(name) {
                    depends_on.insert(ModelName::new(name.clone()));
                }
            }
        }
    }

    depends_on.remove(&model.name);

    for dep in &depends_on {
        if !registry.contains(dep.as_str()) {
            return Err(CoreError::UnknownReference {
                model: model.name.to_string(),
                target: dep.to_string(),
            });
        }
    }
    for source in &sources {
        if !catalog.contains(&source.group, &source.table) {
            return Err(CoreError::SourceUnknownTable {
                group: source.group.clone(),
                table: source.table.clone(),
            });
        }
    }

    let lineage = analysis
        .lineage
        .as_ref()
        .map(|l| convert_lineage(l, registry))
        .unwrap_or_default();

    Ok(ParsedModel {
        name: model.name.clone(),
        fingerprint: model.fingerprint.clone(),
        expanded_sql: expansion.sql,
        depends_on,
        sources,
        variables: referenced_variables(&model.raw_sql),
        config: model.config.clone(),
        lineage,
        warnings: analysis.warnings,
    })
}

/// Convert AST lineage into the engine's per-output-column form, mapping
/// placeholder relations back to their logical names and expanding wildcard
/// edges against upstream schemas where they are declared.
fn convert_lineage(lineage: &cascade_sql::ModelLineage, registry: &ModelRegistry) -> Lineage {
    let mut converted: Lineage = BTreeMap::new();

    // Unqualified columns are attributable when the query reads one relation
    let sole_relation: Option<String> = if lineage.relations.len() == 1 {
        lineage.relations.iter().next().map(|r| logical_relation_name(r))
    } else {
        None
    };

    for column in &lineage.columns {
        let mut origins: BTreeSet<ColumnOrigin> = BTreeSet::new();
        let mut wildcard_expanded: BTreeMap<String, BTreeSet<ColumnOrigin>> = BTreeMap::new();

        for source in &column.sources {
            let relation = source
                .relation
                .as_deref()
                .map(logical_relation_name)
                .or_else(|| sole_relation.clone())
                .unwrap_or_default();

            if source.is_wildcard() && !relation.is_empty() {
                // SELECT * over a model with a declared schema expands to
                // that schema's columns; otherwise the edge stays opaque
                if let Some(columns) = declared_columns(registry, &relation) {
                    for upstream_column in columns {
                        wildcard_expanded
                            .entry(upstream_column.clone())
                            .or_default()
                            .insert(ColumnOrigin {
                                relation: relation.clone(),
                                column: upstream_column,
                            });
                    }
                    continue;
                }
            }

            origins.insert(ColumnOrigin {
                relation,
                column: source.column.clone(),
            });
        }

        if column.output_column == "*" && !wildcard_expanded.is_empty() {
            for (output, expanded) in wildcard_expanded {
                converted.entry(output).or_default().extend(expanded);
            }
            if !origins.is_empty() {
                converted
                    .entry(column.output_column.clone())
                    .or_default()
                    .extend(origins);
            }
            continue;
        }

        for (_, expanded) in wildcard_expanded {
            origins.extend(expanded);
        }
        converted
            .entry(column.output_column.clone())
            .or_default()
            .extend(origins);
    }

    converted
}

/// Strip placeholder decoration from a relation name.
fn logical_relation_name(relation: &str) -> String {
    match cascade_sql::classify_relation(relation) {
        RelationRef::Ref(name) => name,
        RelationRef::Source { group, table } => format!("{}.{}", group, table),
        RelationRef::Bare(name) => name,
    }
}

/// Declared column names of a registered model's schema, if any.
fn declared_columns(registry: &ModelRegistry, name: &str) -> Option<Vec<String>> {
    let model = registry.get(name).ok()?;
    let schema = model.schema.as_ref()?;
    if schema.columns.is_empty() {
        return None;
    }
    Some(schema.columns.iter().map(|c| c.name.clone()).collect())
}

/// Compile every stale model and build the dependency graph over the whole
/// registry.
pub fn compile_all(
    registry: &mut ModelRegistry,
    catalog: &SourceCatalog,
) -> CoreResult<CompileReport> {
    let mut fresh = Vec::new();
    for name in registry.stale() {
        let model = registry.get(name.as_str())?.clone();
        fresh.push(compile_model(&model, registry, catalog)?);
    }
    for parsed in fresh {
        registry.insert_parsed(parsed);
    }

    let mut warnings = Vec::new();
    let mut dependencies: BTreeMap<ModelName, BTreeSet<ModelName>> = BTreeMap::new();
    for name in registry.names() {
        let parsed = registry
            .parsed(name.as_str())
            .ok_or_else(|| CoreError::ModelNotFound {
                name: name.to_string(),
            })?;
        warnings.extend(parsed.warnings.iter().cloned());
        dependencies.insert(name.clone(), parsed.depends_on.clone());
    }

    let graph = DependencyGraph::build(&dependencies)?;
    Ok(CompileReport { graph, warnings })
}

#[cfg(test)]
#[path = "compile_test.rs"]
mod tests;
