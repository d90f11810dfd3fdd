//! Placeholder resolution
//!
//! Converts the compiler's `__REF__`/`__SRC__`/`__THIS__` tokens into
//! physical identifiers once the target environment is known. Runs as a
//! single regex pass over the SQL, immediately before execution.

use crate::error::{ExecError, ExecResult};
use cascade_core::{CoreError, ModelName, ModelRegistry, SourceCatalog};
use regex::Regex;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"__REF__([A-Za-z0-9_.]+?)__\b|__SRC__([A-Za-z0-9_]+?)__([A-Za-z0-9_]+?)__\b|__THIS__")
            .expect("static placeholder regex is valid")
    })
}

/// Resolves logical names to physical identifiers for one environment
pub struct Resolver<'a> {
    registry: &'a ModelRegistry,
    catalog: &'a SourceCatalog,
    database: Option<&'a str>,
    schema: Option<&'a str>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        catalog: &'a SourceCatalog,
        database: Option<&'a str>,
        schema: Option<&'a str>,
    ) -> Self {
        Self {
            registry,
            catalog,
            database,
            schema,
        }
    }

    /// Physical identifier of a model: `<database>.<schema>.<leaf>`.
    ///
    /// The schema comes from, in order: the model's config override, the
    /// dotted prefix of the model name, the profile default.
    pub fn physical_identifier(&self, name: &ModelName, schema_override: Option<&str>) -> String {
        let schema = schema_override
            .or(name.layer())
            .or(self.schema);

        let mut parts: Vec<&str> = Vec::new();
        if let Some(database) = self.database {
            parts.push(database);
        }
        if let Some(schema) = schema {
            parts.push(schema);
        }
        let leaf = name.leaf();
        parts.push(leaf);
        parts.join(".")
    }

    /// Physical identifier of a registered model, honouring its config.
    pub fn model_identifier(&self, name: &ModelName) -> ExecResult<String> {
        let model = self.registry.get(name.as_str())?;
        Ok(self.physical_identifier(name, model.config.schema.as_deref()))
    }

    /// Resolve every placeholder in `sql`. `this` is the physical identifier
    /// of the model being executed.
    pub fn resolve_sql(&self, sql: &str, this: &str) -> ExecResult<String> {
        let re = placeholder_regex();
        let mut failure: Option<ExecError> = None;

        let resolved = re.replace_all(sql, |caps: &regex::Captures<'_>| {
            if failure.is_some() {
                return caps[0].to_string();
            }
            if let Some(name) = caps.get(1) {
                let outcome = ModelName::try_new(name.as_str())
                    .ok_or_else(|| {
                        ExecError::Core(CoreError::ModelNotFound {
                            name: name.as_str().to_string(),
                        })
                    })
                    .and_then(|model_name| self.model_identifier(&model_name));
                match outcome {
                    Ok(identifier) => identifier,
                    Err(e) => {
                        failure = Some(e);
                        caps[0].to_string()
                    }
                }
            } else if let (Some(group), Some(table)) = (caps.get(2), caps.get(3)) {
                match self.catalog.resolve(group.as_str(), table.as_str()) {
                    Ok(identifier) => identifier,
                    Err(e) => {
                        failure = Some(ExecError::Core(e));
                        caps[0].to_string()
                    }
                }
            } else {
                this.to_string()
            }
        });

        match failure {
            Some(error) => Err(error),
            None => Ok(resolved.into_owned()),
        }
    }
}

#[cfg(test)]
#[path = "resolve_test.rs"]
mod tests;
