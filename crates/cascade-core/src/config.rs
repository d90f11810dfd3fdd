//! Configuration types: materialisation kinds, per-model config, and the
//! project file (`cascade.yml`).

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Materialization kind for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    /// CREATE OR REPLACE VIEW (default)
    #[default]
    View,
    /// CREATE OR REPLACE TABLE
    Table,
    /// Session-scoped temporary table
    TempTable,
    /// Incremental table (append / time / unique_key sub-strategies)
    Incremental,
    /// Change-data-capture table with the retirement pattern
    Cdc,
}

impl FromStr for Materialization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "view" => Ok(Materialization::View),
            "table" => Ok(Materialization::Table),
            "temp_table" | "temporary_table" => Ok(Materialization::TempTable),
            "incremental" | "incremental_table" => Ok(Materialization::Incremental),
            "cdc" => Ok(Materialization::Cdc),
            other => Err(format!("unknown materialization '{}'", other)),
        }
    }
}

impl std::fmt::Display for Materialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Materialization::View => "view",
            Materialization::Table => "table",
            Materialization::TempTable => "temp_table",
            Materialization::Incremental => "incremental",
            Materialization::Cdc => "cdc",
        };
        f.write_str(s)
    }
}

/// Sub-strategy for incremental materialisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncrementalStrategy {
    /// Insert rows newer than the stored high-watermark (default)
    #[default]
    Append,
    /// Plain insert; the model guards itself via `is_incremental()`
    Time,
    /// MERGE on the configured unique key
    UniqueKey,
}

impl FromStr for IncrementalStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(IncrementalStrategy::Append),
            "time" => Ok(IncrementalStrategy::Time),
            "unique_key" => Ok(IncrementalStrategy::UniqueKey),
            other => Err(format!("unknown incremental strategy '{}'", other)),
        }
    }
}

impl std::fmt::Display for IncrementalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IncrementalStrategy::Append => "append",
            IncrementalStrategy::Time => "time",
            IncrementalStrategy::UniqueKey => "unique_key",
        };
        f.write_str(s)
    }
}

/// Behaviour when the target's schema has drifted from the model's SELECT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnSchemaChange {
    /// Leave the target schema alone (default)
    #[default]
    Ignore,
    /// ALTER TABLE ADD COLUMN for columns the target is missing
    AppendNewColumns,
}

impl FromStr for OnSchemaChange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(OnSchemaChange::Ignore),
            "append_new_columns" => Ok(OnSchemaChange::AppendNewColumns),
            other => Err(format!("unknown on_schema_change '{}'", other)),
        }
    }
}

/// Per-model configuration, merged from the `-- config:` comment and the
/// model's schema YAML. Comment values win over YAML on conflicts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Materialization kind
    #[serde(default)]
    pub materialized: Materialization,

    /// Incremental sub-strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_strategy: Option<IncrementalStrategy>,

    /// Time column for append-style incremental models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_column: Option<String>,

    /// Unique key (comma-separated for composite keys)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,

    /// Schema drift handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_schema_change: Option<OnSchemaChange>,

    /// Clustering keys for table/incremental targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_by: Vec<String>,

    /// Target schema override (otherwise derived from the model name layer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Tags for selection and reporting
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Variables the model declares it needs at execution time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<String>,

    /// Whether the model participates in runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Unrecognised keys, kept for fingerprinting and inspection
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,

    /// The merged key/value map this config was parsed from. Part of the
    /// model fingerprint.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl ModelConfig {
    /// Build from the `-- config:` comment map alone.
    pub fn from_comment_map(comment: &BTreeMap<String, String>) -> CoreResult<Self> {
        Self::from_maps(comment, &BTreeMap::new())
    }

    /// Build from the comment map merged over the schema-YAML config map.
    /// Comment keys take precedence.
    pub fn from_maps(
        comment: &BTreeMap<String, String>,
        yaml: &BTreeMap<String, String>,
    ) -> CoreResult<Self> {
        let mut merged: BTreeMap<String, String> = yaml.clone();
        for (k, v) in comment {
            merged.insert(k.clone(), v.clone());
        }

        let mut config = ModelConfig {
            enabled: true,
            ..ModelConfig::default()
        };

        for (key, value) in &merged {
            match key.as_str() {
                "materialized" => {
                    config.materialized = parse_key(key, value)?;
                }
                "incremental_strategy" => {
                    config.incremental_strategy = Some(parse_key(key, value)?);
                }
                "time_column" => config.time_column = Some(value.clone()),
                "unique_key" => config.unique_key = Some(value.clone()),
                "on_schema_change" => {
                    config.on_schema_change = Some(parse_key(key, value)?);
                }
                "cluster_by" => {
                    config.cluster_by = split_list(value);
                }
                "schema" => config.schema = Some(value.clone()),
                "tags" => config.tags = split_list(value),
                "vars" => config.vars = split_list(value),
                "enabled" => {
                    config.enabled = match value.to_ascii_lowercase().as_str() {
                        "true" | "yes" | "1" => true,
                        "false" | "no" | "0" => false,
                        other => {
                            return Err(CoreError::ConfigInvalid {
                                scope: key.clone(),
                                message: format!("expected boolean, got '{}'", other),
                            })
                        }
                    };
                }
                _ => {
                    config.meta.insert(key.clone(), value.clone());
                }
            }
        }

        config.raw = merged;
        Ok(config)
    }

    /// Split a composite `unique_key` into its column names.
    pub fn unique_keys(&self) -> Vec<String> {
        self.unique_key
            .as_deref()
            .map(split_list)
            .unwrap_or_default()
    }

    /// Validate strategy-specific requirements for a named model.
    pub fn validate(&self, model: &str) -> CoreResult<()> {
        let invalid = |message: String| CoreError::ConfigInvalid {
            scope: model.to_string(),
            message,
        };

        match self.materialized {
            Materialization::Incremental => {
                let strategy = self.incremental_strategy.unwrap_or_default();
                match strategy {
                    IncrementalStrategy::Append => {
                        if self.time_column.is_none() {
                            return Err(invalid(
                                "incremental append strategy requires time_column".to_string(),
                            ));
                        }
                    }
                    IncrementalStrategy::Time => {}
                    IncrementalStrategy::UniqueKey => {
                        if self.unique_key.is_none() {
                            return Err(invalid(
                                "incremental unique_key strategy requires unique_key".to_string(),
                            ));
                        }
                    }
                }
            }
            Materialization::Cdc => {
                if self.unique_key.is_none() {
                    return Err(invalid("cdc materialization requires unique_key".to_string()));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_key<T: FromStr<Err = String>>(key: &str, value: &str) -> CoreResult<T> {
    value.parse().map_err(|message| CoreError::ConfigInvalid {
        scope: key.to_string(),
        message,
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Warehouse connection profile (passed through to the driver)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Connection pool sizing and session policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolProfile {
    /// Maximum concurrent connections
    #[serde(default = "default_pool_size")]
    pub size: usize,

    /// Seconds to wait for a free connection before failing
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Session variables applied at connection acquire
    #[serde(default)]
    pub session_variables: BTreeMap<String, String>,
}

impl Default for PoolProfile {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            acquire_timeout_secs: default_acquire_timeout(),
            session_variables: BTreeMap::new(),
        }
    }
}

fn default_pool_size() -> usize {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Retry policy for transient warehouse failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryProfile {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryProfile {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_factor: default_backoff_factor(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

/// Project configuration from cascade.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Directories containing model SQL files
    #[serde(default = "default_model_paths")]
    pub model_paths: Vec<String>,

    /// Path to the sources catalogue
    #[serde(default = "default_sources_path")]
    pub sources_path: String,

    /// Directory for per-environment state snapshots
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Default environment name
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Warehouse backend ("snowflake" or "mock")
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Default materialization for models without one
    #[serde(default)]
    pub materialization: Materialization,

    /// Connection profile
    #[serde(default)]
    pub connection: ConnectionProfile,

    /// Pool configuration
    #[serde(default)]
    pub pool: PoolProfile,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryProfile,

    /// Variables available to `$var` substitution
    #[serde(default)]
    pub vars: BTreeMap<String, serde_yaml::Value>,

    /// Stop the run at the first failed model
    #[serde(default)]
    pub fail_fast: bool,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_model_paths() -> Vec<String> {
    vec!["models".to_string()]
}

fn default_sources_path() -> String {
    "sources.yml".to_string()
}

fn default_state_path() -> String {
    ".cascade/state".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_backend() -> String {
    "snowflake".to_string()
}

impl ProjectConfig {
    /// Load cascade.yml from a project directory.
    pub fn load(project_dir: &Path) -> CoreResult<Self> {
        let path = project_dir.join("cascade.yml");
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: ProjectConfig =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                message: format!("{}: {}", path.display(), e),
            })?;
        Ok(config)
    }

    /// Absolute model directories for a project root.
    pub fn model_dirs(&self, root: &Path) -> Vec<PathBuf> {
        self.model_paths.iter().map(|p| root.join(p)).collect()
    }

    /// Absolute path of the sources catalogue.
    pub fn sources_file(&self, root: &Path) -> PathBuf {
        root.join(&self.sources_path)
    }

    /// Absolute state directory.
    pub fn state_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.state_path)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
