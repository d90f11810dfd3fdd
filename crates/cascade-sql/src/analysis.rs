//! One-shot SQL analysis with graceful degradation
//!
//! The AST is the engine's weakest seam: a parse failure must never stop a
//! model from running. `analyze` returns whatever it could extract plus a
//! warning describing what it could not.

use crate::extractor::{classify_relations, RelationRef};
use crate::lineage::{extract_lineage, ModelLineage};
use crate::parser::SqlParser;
use std::collections::BTreeSet;

/// Everything the AST layer could learn about one model's SQL
#[derive(Debug, Clone, Default)]
pub struct SqlAnalysis {
    /// Classified relations referenced by the SQL
    pub relations: BTreeSet<RelationRef>,

    /// Column lineage of the first statement, when it parsed as a query
    pub lineage: Option<ModelLineage>,

    /// Non-fatal analysis warnings (parse failures, lineage gaps)
    pub warnings: Vec<String>,
}

/// Analyse expanded model SQL.
///
/// Never fails: a SQL string sqlparser cannot handle produces an empty
/// analysis carrying a parse warning, and the caller proceeds without
/// lineage (the SQL still runs).
pub fn analyze(sql: &str, model_name: &str) -> SqlAnalysis {
    let parser = SqlParser::snowflake();

    let statements = match parser.parse(sql) {
        Ok(stmts) => stmts,
        Err(e) => {
            log::debug!("AST parse failed for {}: {}", model_name, e);
            return SqlAnalysis {
                relations: BTreeSet::new(),
                lineage: None,
                warnings: vec![format!("parse warning for {}: {}", model_name, e)],
            };
        }
    };

    let relations = classify_relations(&statements);

    let mut warnings = Vec::new();
    let lineage = statements.first().and_then(extract_lineage);
    if lineage.is_none() {
        warnings.push(format!(
            "lineage warning for {}: statement is not a plain query, column lineage unavailable",
            model_name
        ));
    }

    SqlAnalysis {
        relations,
        lineage,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_query() {
        let analysis = analyze("SELECT id FROM __REF__silver.a__", "gold.b");
        assert!(analysis.warnings.is_empty());
        assert!(analysis
            .relations
            .contains(&RelationRef::Ref("silver.a".to_string())));
        assert!(analysis.lineage.is_some());
    }

    #[test]
    fn test_analyze_unparseable_degrades() {
        let analysis = analyze("SELECT )( FROM nowhere", "gold.broken");
        assert!(analysis.relations.is_empty());
        assert!(analysis.lineage.is_none());
        assert_eq!(analysis.warnings.len(), 1);
        assert!(analysis.warnings[0].contains("parse warning"));
    }

    #[test]
    fn test_analyze_non_query_warns_on_lineage() {
        let analysis = analyze("CREATE TABLE t (id INT)", "gold.ddl");
        assert!(analysis.lineage.is_none());
        assert_eq!(analysis.warnings.len(), 1);
        assert!(analysis.warnings[0].contains("lineage warning"));
    }
}
