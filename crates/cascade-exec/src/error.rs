//! Error taxonomy for the execution runtime
//!
//! Model-level failures are recoverable: the executor records them and moves
//! on. Missing variables and configuration problems abort the run. Every
//! failure carries structured context that survives propagation.

use cascade_core::CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured context attached to execution failures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// What the engine was doing ("create view", "cdc retire", ...)
    pub operation: String,

    /// Model involved, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Leading fragment of the SQL that failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_fragment: Option<String>,

    /// The driver's error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_error: Option<String>,

    /// Retries spent before giving up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Attach a truncated SQL fragment (first 200 chars).
    pub fn with_sql(mut self, sql: &str) -> Self {
        let fragment: String = sql.chars().take(200).collect();
        self.sql_fragment = Some(fragment);
        self
    }

    pub fn with_driver_error(mut self, error: impl std::fmt::Display) -> Self {
        self.driver_error = Some(error.to_string());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry_count = Some(retries);
        self
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation={}", self.operation)?;
        if let Some(model) = &self.model_name {
            write!(f, " model={}", model)?;
        }
        if let Some(driver) = &self.driver_error {
            write!(f, " driver_error={}", driver)?;
        }
        if let Some(retries) = self.retry_count {
            write!(f, " retries={}", retries)?;
        }
        if let Some(sql) = &self.sql_fragment {
            write!(f, " sql={}", sql)?;
        }
        Ok(())
    }
}

/// Execution runtime errors
#[derive(Error, Debug)]
pub enum ExecError {
    /// X001: One model failed; the run continues unless fail-fast
    #[error("[X001] Model '{model}' failed: {context}")]
    ModelExecutionFailure { model: String, context: ErrorContext },

    /// X002: A declared or referenced `$variable` has no value (aborts the run)
    #[error("[X002] Missing value for variable '${name}' required by '{model}'")]
    MissingVariable { name: String, model: String },

    /// X003: A strategy cannot run with the model's configuration
    #[error("[X003] Invalid strategy configuration for '{model}': {message}")]
    StrategyConfig { model: String, message: String },

    /// X004: the state writer task died mid-run
    #[error("[X004] State writer task failed: {message}")]
    StateWriter { message: String },

    /// Compile/registry errors surfacing at execution time
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ExecError {
    /// The context of a model failure, when present.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ExecError::ModelExecutionFailure { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Result type alias for ExecError
pub type ExecResult<T> = Result<T, ExecError>;
