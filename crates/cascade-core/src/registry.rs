//! Model registry
//!
//! Owns every registered `Model` and the compiled `ParsedModel` artefacts.
//! Registration is atomic: a model is either wholly replaced or the prior
//! version remains. Re-registration invalidates the cached parse.

use crate::config::ModelConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{Model, ParsedModel};
use crate::model_name::ModelName;
use crate::schema::{ModelSchema, SchemaFile};
use cascade_template::extract_header;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Registry mapping logical names to models and their compiled artefacts
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<ModelName, Model>,
    parsed: HashMap<ModelName, ParsedModel>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the dotted model name from a path relative to the models root:
    /// `silver/cleaned_orders.sql` -> `silver.cleaned_orders`.
    pub fn model_name_from_path(rel_path: &Path) -> CoreResult<ModelName> {
        let stripped = rel_path.with_extension("");
        let mut segments = Vec::new();
        for component in stripped.components() {
            match component.as_os_str().to_str() {
                Some(s) => segments.push(s.to_string()),
                None => {
                    return Err(CoreError::ModelRegistration {
                        path: rel_path.display().to_string(),
                        message: "path is not valid UTF-8".to_string(),
                    })
                }
            }
        }
        ModelName::from_segments(segments).ok_or_else(|| CoreError::ModelRegistration {
            path: rel_path.display().to_string(),
            message: "path does not form a valid dotted model name".to_string(),
        })
    }

    /// Register (upsert) a model from its relative path and raw text.
    pub fn register(&mut self, rel_path: &Path, text: &str) -> CoreResult<ModelName> {
        self.register_with_schema(rel_path, text, None)
    }

    /// Register (upsert) a model, attaching schema-YAML metadata.
    pub fn register_with_schema(
        &mut self,
        rel_path: &Path,
        text: &str,
        schema: Option<ModelSchema>,
    ) -> CoreResult<ModelName> {
        let name = Self::model_name_from_path(rel_path)?;

        if text.trim().is_empty() {
            return Err(CoreError::ModelRegistration {
                path: rel_path.display().to_string(),
                message: "SQL file is empty".to_string(),
            });
        }

        let header = extract_header(text);
        let yaml_config: BTreeMap<String, String> = schema
            .as_ref()
            .map(|s| s.config.clone())
            .unwrap_or_default();
        let config = ModelConfig::from_maps(&header.config, &yaml_config)?;
        config.validate(name.as_str())?;

        let extra_deps: BTreeSet<ModelName> = header
            .depends_on
            .iter()
            .filter_map(|d| ModelName::try_new(d.clone()))
            .collect();

        let fingerprint = Model::compute_fingerprint(text, &config);
        let model = Model {
            name: name.clone(),
            path: rel_path.to_path_buf(),
            raw_sql: text.to_string(),
            fingerprint,
            config,
            extra_deps,
            schema,
        };

        // Whole replacement; the cached parse is stale from here on
        self.models.insert(name.clone(), model);
        self.parsed.remove(&name);
        Ok(name)
    }

    /// Remove a model (e.g. its file disappeared on the last registration pass).
    pub fn remove(&mut self, name: &str) -> CoreResult<Model> {
        self.parsed.remove(name);
        self.models
            .remove(name)
            .ok_or_else(|| CoreError::ModelNotFound {
                name: name.to_string(),
            })
    }

    /// Get a model by name.
    pub fn get(&self, name: &str) -> CoreResult<&Model> {
        self.models.get(name).ok_or_else(|| CoreError::ModelNotFound {
            name: name.to_string(),
        })
    }

    /// True if the name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// All models, sorted by name.
    pub fn list(&self) -> Vec<&Model> {
        let mut models: Vec<&Model> = self.models.values().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }

    /// All model names, sorted.
    pub fn names(&self) -> BTreeSet<ModelName> {
        self.models.keys().cloned().collect()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True when no models are registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Store a compiled artefact. Artefacts whose fingerprint no longer
    /// matches the registered model are ignored as stale.
    pub fn insert_parsed(&mut self, parsed: ParsedModel) {
        if let Some(model) = self.models.get(&parsed.name) {
            if model.fingerprint == parsed.fingerprint {
                self.parsed.insert(parsed.name.clone(), parsed);
            }
        }
    }

    /// Fetch the compiled artefact for a model, if present and fresh.
    pub fn parsed(&self, name: &str) -> Option<&ParsedModel> {
        let parsed = self.parsed.get(name)?;
        let model = self.models.get(name)?;
        (parsed.fingerprint == model.fingerprint).then_some(parsed)
    }

    /// Names of models with no fresh compiled artefact.
    pub fn stale(&self) -> Vec<ModelName> {
        let mut stale: Vec<ModelName> = self
            .models
            .keys()
            .filter(|name| self.parsed(name.as_str()).is_none())
            .cloned()
            .collect();
        stale.sort();
        stale
    }

    /// Load every model under a models directory.
    ///
    /// `schema.yml` files are loaded first and matched to models by full
    /// dotted name, falling back to the leaf name when unambiguous.
    pub fn load_dir(models_root: &Path) -> CoreResult<Self> {
        if !models_root.exists() {
            return Err(CoreError::ProjectNotFound {
                path: models_root.display().to_string(),
            });
        }

        let mut sql_files = Vec::new();
        let mut schema_files = Vec::new();
        collect_files(models_root, models_root, &mut sql_files, &mut schema_files)?;

        // Index schema entries by declared name and by leaf
        let mut by_name: HashMap<String, ModelSchema> = HashMap::new();
        let mut by_leaf: HashMap<String, Vec<ModelSchema>> = HashMap::new();
        for path in &schema_files {
            let file = SchemaFile::load(path)?;
            for model_schema in file.models {
                let leaf = model_schema
                    .name
                    .rsplit('.')
                    .next()
                    .unwrap_or(&model_schema.name)
                    .to_string();
                by_leaf.entry(leaf).or_default().push(model_schema.clone());
                by_name.insert(model_schema.name.clone(), model_schema);
            }
        }

        let mut registry = Self::new();
        for rel_path in sql_files {
            let abs = models_root.join(&rel_path);
            let text = std::fs::read_to_string(&abs).map_err(|e| CoreError::IoWithPath {
                path: abs.display().to_string(),
                source: e,
            })?;

            let name = Self::model_name_from_path(&rel_path)?;
            if registry.contains(name.as_str()) {
                return Err(CoreError::DuplicateModel {
                    name: name.into_inner(),
                });
            }

            let schema = by_name.get(name.as_str()).cloned().or_else(|| {
                match by_leaf.get(name.leaf()) {
                    Some(entries) if entries.len() == 1 => Some(entries[0].clone()),
                    _ => None,
                }
            });

            registry.register_with_schema(&rel_path, &text, schema)?;
        }

        Ok(registry)
    }
}

/// Recursively collect model SQL files (relative paths) and schema files
/// (absolute paths).
fn collect_files(
    root: &Path,
    dir: &Path,
    sql_files: &mut Vec<PathBuf>,
    schema_files: &mut Vec<PathBuf>,
) -> CoreResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })? {
        let entry = entry.map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, sql_files, schema_files)?;
            continue;
        }

        match path.extension().and_then(|e| e.to_str()) {
            Some("sql") => {
                if let Ok(rel) = path.strip_prefix(root) {
                    sql_files.push(rel.to_path_buf());
                }
            }
            Some("yml") | Some("yaml") => {
                if path.file_stem().is_some_and(|s| s == "schema") {
                    schema_files.push(path);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
