//! Error types for cascade-core

use thiserror::Error;

/// Core error type for Cascade
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config for '{scope}': {message}")]
    ConfigInvalid { scope: String, message: String },

    /// E004: Project directory not found
    #[error("[E004] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    /// E005: Model not found in the registry
    #[error("[E005] Model not found: {name}")]
    ModelNotFound { name: String },

    /// E006: Model file could not be registered
    #[error("[E006] Cannot register model from '{path}': {message}")]
    ModelRegistration { path: String, message: String },

    /// E007: Circular dependency detected
    #[error("[E007] Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// E008: Duplicate model name
    #[error("[E008] Duplicate model name: {name}")]
    DuplicateModel { name: String },

    /// E009: A ref() targets an unknown model
    #[error("[E009] Model '{model}' references unknown model '{target}'")]
    UnknownReference { model: String, target: String },

    /// E010: Template expansion failed
    #[error("[E010] Template error in '{model}': {source}")]
    Template {
        model: String,
        #[source]
        source: cascade_template::TemplateError,
    },

    // Source catalogue errors (SRC001-SRC004)
    /// SRC001: Failed to parse the sources catalogue
    #[error("[SRC001] Failed to parse sources file {path}: {details}")]
    SourceParseError { path: String, details: String },

    /// SRC002: Duplicate source group
    #[error("[SRC002] Duplicate source group '{name}'")]
    SourceDuplicateGroup { name: String },

    /// SRC003: Unknown source group
    #[error("[SRC003] Unknown source group '{group}'")]
    SourceUnknownGroup { group: String },

    /// SRC004: Unknown table within a source group
    #[error("[SRC004] Unknown table '{table}' in source group '{group}'")]
    SourceUnknownTable { group: String, table: String },

    /// E011: IO error
    #[error("[E011] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E012: IO error with file path context
    #[error("[E012] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// E013: YAML parse error
    #[error("[E013] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
