//! Sibling schema files (`schema.yml`)
//!
//! A directory of models may carry a `schema.yml` describing them: docs,
//! column tests, and extra config. Config keys declared here lose to the
//! model's own `-- config:` comment on conflict.

use crate::error::CoreResult;
use crate::model_name::ModelName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A `schema.yml` document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaFile {
    #[serde(default)]
    pub models: Vec<ModelSchema>,
}

impl SchemaFile {
    /// Load a schema file from disk.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| crate::error::CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Schema metadata for one model
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelSchema {
    /// Model name; either the full dotted name or the leaf
    pub name: String,

    /// Human description
    #[serde(default)]
    pub description: Option<String>,

    /// Extra config, merged under the `-- config:` comment
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    /// Column documentation and tests
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,

    /// Model-level tests
    #[serde(default)]
    pub tests: Vec<TestDefinition>,
}

/// One column's documentation and tests
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnSchema {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tests: Vec<TestDefinition>,
}

/// A test as written in YAML: either a bare name or a parameterised map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestDefinition {
    /// `- not_null`
    Name(String),
    /// `- accepted_values: { values: [a, b] }`
    WithParams(BTreeMap<String, TestParams>),
}

/// Parameters of a parameterised test
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TestParams {
    #[serde(default)]
    pub values: Vec<serde_yaml::Value>,
}

/// Built-in data quality test kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    NotNull,
    Unique,
    AcceptedValues,
}

impl TestKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "not_null" => Some(TestKind::NotNull),
            "unique" => Some(TestKind::Unique),
            "accepted_values" => Some(TestKind::AcceptedValues),
            _ => None,
        }
    }
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestKind::NotNull => "not_null",
            TestKind::Unique => "unique",
            TestKind::AcceptedValues => "accepted_values",
        };
        f.write_str(s)
    }
}

/// A concrete, runnable schema test
#[derive(Debug, Clone)]
pub struct SchemaTest {
    pub kind: TestKind,
    pub model: ModelName,
    pub column: Option<String>,
    pub values: Vec<String>,
}

impl SchemaTest {
    /// Render the test as a failure-counting probe against the model's
    /// physical relation. Zero failures means the test passes.
    pub fn to_sql(&self, physical: &str) -> String {
        let column = self.column.as_deref().unwrap_or("*");
        match self.kind {
            TestKind::NotNull => format!(
                "SELECT COUNT(*) AS failures FROM {} WHERE {} IS NULL",
                physical, column
            ),
            TestKind::Unique => format!(
                "SELECT COUNT(*) AS failures FROM (SELECT {col}, COUNT(*) AS cnt FROM {rel} GROUP BY {col} HAVING COUNT(*) > 1)",
                col = column,
                rel = physical
            ),
            TestKind::AcceptedValues => {
                let list = self
                    .values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "SELECT COUNT(*) AS failures FROM {} WHERE {} NOT IN ({})",
                    physical, column, list
                )
            }
        }
    }

    /// Display name, e.g. `not_null(silver.orders.id)`
    pub fn display_name(&self) -> String {
        match &self.column {
            Some(column) => format!("{}({}.{})", self.kind, self.model, column),
            None => format!("{}({})", self.kind, self.model),
        }
    }
}

impl ModelSchema {
    /// Extract the runnable tests declared for a model. Unknown test names
    /// are skipped with a warning (they are someone else's extension).
    pub fn extract_tests(&self, model: &ModelName) -> Vec<SchemaTest> {
        let mut tests = Vec::new();

        for def in &self.tests {
            if let Some(test) = build_test(def, model, None) {
                tests.push(test);
            }
        }
        for column in &self.columns {
            for def in &column.tests {
                if let Some(test) = build_test(def, model, Some(&column.name)) {
                    tests.push(test);
                }
            }
        }

        tests
    }
}

fn build_test(
    def: &TestDefinition,
    model: &ModelName,
    column: Option<&str>,
) -> Option<SchemaTest> {
    let (name, params) = match def {
        TestDefinition::Name(name) => (name.as_str(), None),
        TestDefinition::WithParams(map) => {
            let (name, params) = map.iter().next()?;
            (name.as_str(), Some(params))
        }
    };

    let Some(kind) = TestKind::parse(name) else {
        log::warn!("skipping unknown test '{}' on {}", name, model);
        return None;
    };

    let values = params
        .map(|p| {
            p.values
                .iter()
                .map(|v| match v {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => serde_yaml::to_string(other)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(SchemaTest {
        kind,
        model: model.clone(),
        column: column.map(String::from),
        values,
    })
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod tests;
