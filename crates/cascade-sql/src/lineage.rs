//! Column-level lineage extraction
//!
//! For each top-level SELECT projection, traces the output column back to the
//! base-relation columns it is derived from. Table aliases are resolved to
//! the underlying relation name. `SELECT *` and `SELECT t.*` record a
//! wildcard edge (`column = "*"`) against the relations they draw from; the
//! compiler expands those against upstream schemas when they are known.

use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins,
};
use std::collections::{BTreeMap, BTreeSet};

/// A column reference attributed to a relation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColumnRef {
    /// Relation the column belongs to, when attributable
    pub relation: Option<String>,
    /// Column name; `"*"` marks a wildcard edge
    pub column: String,
}

impl ColumnRef {
    /// An unattributed column
    pub fn bare(column: &str) -> Self {
        Self {
            relation: None,
            column: column.to_string(),
        }
    }

    /// A relation-qualified column
    pub fn qualified(relation: &str, column: &str) -> Self {
        Self {
            relation: Some(relation.to_string()),
            column: column.to_string(),
        }
    }

    /// True if this is a wildcard edge
    pub fn is_wildcard(&self) -> bool {
        self.column == "*"
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.relation {
            Some(rel) => write!(f, "{}.{}", rel, self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// Lineage for a single output column
#[derive(Debug, Clone, Default)]
pub struct ColumnLineage {
    /// Output column name as projected
    pub output_column: String,
    /// Upstream columns contributing to this output
    pub sources: BTreeSet<ColumnRef>,
    /// True when the output is an untransformed column reference
    pub is_direct: bool,
}

impl ColumnLineage {
    fn new(output_column: &str) -> Self {
        Self {
            output_column: output_column.to_string(),
            sources: BTreeSet::new(),
            is_direct: false,
        }
    }

    fn direct(output_column: &str, source: ColumnRef) -> Self {
        let mut lineage = Self::new(output_column);
        lineage.sources.insert(source);
        lineage.is_direct = true;
        lineage
    }
}

/// Lineage for all output columns of one model
#[derive(Debug, Clone, Default)]
pub struct ModelLineage {
    /// Per-projection lineage, in projection order
    pub columns: Vec<ColumnLineage>,
    /// alias -> relation mappings seen in FROM/JOIN clauses
    pub aliases: BTreeMap<String, String>,
    /// Relations referenced by the top-level SELECT
    pub relations: BTreeSet<String>,
}

impl ModelLineage {
    /// Look up the lineage of an output column by name
    pub fn column(&self, name: &str) -> Option<&ColumnLineage> {
        self.columns.iter().find(|c| c.output_column == name)
    }
}

/// Extract column lineage from a statement, if it is a query.
pub fn extract_lineage(stmt: &Statement) -> Option<ModelLineage> {
    match stmt {
        Statement::Query(query) => {
            let mut lineage = ModelLineage::default();
            walk_query(query, &mut lineage);
            Some(lineage)
        }
        _ => None,
    }
}

fn walk_query(query: &Query, lineage: &mut ModelLineage) {
    if let SetExpr::Select(select) = query.body.as_ref() {
        walk_select(select, lineage);
    }
}

fn walk_select(select: &Select, lineage: &mut ModelLineage) {
    for table in &select.from {
        collect_aliases(table, lineage);
    }

    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) => {
                let col = lineage_of_expr(expr, lineage);
                lineage.columns.push(col);
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                let mut col = lineage_of_expr(expr, lineage);
                col.output_column = alias.value.clone();
                lineage.columns.push(col);
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let relation = crate::object_name_to_string(name);
                let resolved = resolve_alias(&relation, lineage);
                let mut col = ColumnLineage::new("*");
                col.sources.insert(ColumnRef::qualified(&resolved, "*"));
                lineage.columns.push(col);
            }
            SelectItem::Wildcard(_) => {
                let mut col = ColumnLineage::new("*");
                for relation in lineage.relations.clone() {
                    col.sources.insert(ColumnRef::qualified(&relation, "*"));
                }
                lineage.columns.push(col);
            }
        }
    }
}

fn collect_aliases(table_with_joins: &TableWithJoins, lineage: &mut ModelLineage) {
    collect_factor(&table_with_joins.relation, lineage);
    for join in &table_with_joins.joins {
        collect_factor(&join.relation, lineage);
    }
}

fn collect_factor(factor: &TableFactor, lineage: &mut ModelLineage) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let relation = crate::object_name_to_string(name);
            lineage.relations.insert(relation.clone());
            if let Some(alias) = alias {
                lineage.aliases.insert(alias.name.value.clone(), relation);
            }
        }
        TableFactor::Derived {
            alias, subquery, ..
        } => {
            // Fold the subquery's lineage into the outer scope
            if let SetExpr::Select(select) = subquery.body.as_ref() {
                walk_select(select, lineage);
            }
            if let Some(alias) = alias {
                lineage
                    .aliases
                    .insert(alias.name.value.clone(), alias.name.value.clone());
            }
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            collect_aliases(table_with_joins, lineage);
        }
        _ => {}
    }
}

fn resolve_alias(name: &str, lineage: &ModelLineage) -> String {
    lineage
        .aliases
        .get(name)
        .cloned()
        .unwrap_or_else(|| name.to_string())
}

fn lineage_of_expr(expr: &Expr, lineage: &ModelLineage) -> ColumnLineage {
    match expr {
        Expr::Identifier(ident) => {
            ColumnLineage::direct(&ident.value, ColumnRef::bare(&ident.value))
        }
        Expr::CompoundIdentifier(idents) if idents.len() >= 2 => {
            let column = idents.last().map(|i| i.value.clone()).unwrap_or_default();
            let relation = idents[..idents.len() - 1]
                .iter()
                .map(|i| i.value.clone())
                .collect::<Vec<_>>()
                .join(".");
            let resolved = resolve_alias(&relation, lineage);
            ColumnLineage::direct(&column, ColumnRef::qualified(&resolved, &column))
        }
        Expr::CompoundIdentifier(idents) => {
            let column = idents
                .last()
                .map(|i| i.value.clone())
                .unwrap_or_else(|| "unknown".to_string());
            ColumnLineage::new(&column)
        }
        Expr::Function(func) => {
            let name = crate::object_name_to_string(&func.name);
            let mut col = ColumnLineage::new(&name);
            collect_function_sources(&func.args, lineage, &mut col.sources);
            col
        }
        Expr::BinaryOp { left, right, .. } => {
            let mut col = ColumnLineage::new("expression");
            col.sources.extend(lineage_of_expr(left, lineage).sources);
            col.sources.extend(lineage_of_expr(right, lineage).sources);
            col
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => {
            let inner = lineage_of_expr(expr, lineage);
            let mut col = ColumnLineage::new(&inner.output_column);
            col.sources = inner.sources;
            col
        }
        Expr::Cast { expr, .. } => {
            let inner = lineage_of_expr(expr, lineage);
            let mut col = ColumnLineage::new(&inner.output_column);
            col.sources = inner.sources;
            col
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let mut col = ColumnLineage::new("case_expr");
            if let Some(op) = operand {
                col.sources.extend(lineage_of_expr(op, lineage).sources);
            }
            for cond in conditions {
                col.sources.extend(lineage_of_expr(cond, lineage).sources);
            }
            for result in results {
                col.sources.extend(lineage_of_expr(result, lineage).sources);
            }
            if let Some(else_expr) = else_result {
                col.sources
                    .extend(lineage_of_expr(else_expr, lineage).sources);
            }
            col
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
            let inner = lineage_of_expr(inner, lineage);
            let mut col = ColumnLineage::new(&inner.output_column);
            col.sources = inner.sources;
            col
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            let mut col = ColumnLineage::new("between_expr");
            col.sources.extend(lineage_of_expr(expr, lineage).sources);
            col.sources.extend(lineage_of_expr(low, lineage).sources);
            col.sources.extend(lineage_of_expr(high, lineage).sources);
            col
        }
        Expr::InList { expr, list, .. } => {
            let mut col = ColumnLineage::new("in_expr");
            col.sources.extend(lineage_of_expr(expr, lineage).sources);
            for item in list {
                col.sources.extend(lineage_of_expr(item, lineage).sources);
            }
            col
        }
        Expr::Subquery(query) => {
            let mut sub = ModelLineage::default();
            walk_query(query, &mut sub);
            let mut col = ColumnLineage::new("subquery");
            for inner in sub.columns {
                col.sources.extend(inner.sources);
            }
            col
        }
        Expr::Value(_) | Expr::TypedString { .. } => ColumnLineage::new("literal"),
        _ => ColumnLineage::new("unknown"),
    }
}

fn collect_function_sources(
    args: &sqlparser::ast::FunctionArguments,
    lineage: &ModelLineage,
    sources: &mut BTreeSet<ColumnRef>,
) {
    match args {
        sqlparser::ast::FunctionArguments::List(list) => {
            for arg in &list.args {
                match arg {
                    FunctionArg::Unnamed(arg_expr) | FunctionArg::Named { arg: arg_expr, .. } => {
                        match arg_expr {
                            FunctionArgExpr::Expr(expr) => {
                                sources.extend(lineage_of_expr(expr, lineage).sources);
                            }
                            FunctionArgExpr::QualifiedWildcard(name) => {
                                let relation = crate::object_name_to_string(name);
                                let resolved = resolve_alias(&relation, lineage);
                                sources.insert(ColumnRef::qualified(&resolved, "*"));
                            }
                            FunctionArgExpr::Wildcard => {
                                sources.insert(ColumnRef::bare("*"));
                            }
                        }
                    }
                }
            }
        }
        sqlparser::ast::FunctionArguments::None => {}
        sqlparser::ast::FunctionArguments::Subquery(query) => {
            let mut sub = ModelLineage::default();
            walk_query(query, &mut sub);
            for col in sub.columns {
                sources.extend(col.sources);
            }
        }
    }
}

#[cfg(test)]
#[path = "lineage_test.rs"]
mod tests;
