//! Error types for cascade-template

use thiserror::Error;

/// Template expansion errors, all carrying line/column context
#[derive(Error, Debug)]
pub enum TemplateError {
    /// T001: An expression inside `{{ }}` that is not part of the dialect
    #[error("[T001] Unknown template expression '{expr}' at line {line}, column {column}")]
    UnknownExpression {
        expr: String,
        line: usize,
        column: usize,
    },

    /// T002: A `{% %}` tag that is not `if`/`else`/`endif`
    #[error("[T002] Unknown template tag '{tag}' at line {line}, column {column}")]
    UnknownTag {
        tag: String,
        line: usize,
        column: usize,
    },

    /// T003: A `{{` or `{%` with no matching closer
    #[error("[T003] Unclosed '{open}' at line {line}, column {column}")]
    UnclosedDelimiter {
        open: &'static str,
        line: usize,
        column: usize,
    },

    /// T004: `{% if %}` without a matching `{% endif %}`
    #[error("[T004] Unterminated if block opened at line {line}, column {column}")]
    UnterminatedIf { line: usize, column: usize },

    /// T005: `{% else %}` or `{% endif %}` with no open if block
    #[error("[T005] '{tag}' without matching if at line {line}, column {column}")]
    DanglingTag {
        tag: String,
        line: usize,
        column: usize,
    },

    /// T006: An if condition outside the supported set
    #[error("[T006] Unsupported if condition '{expr}' at line {line}, column {column}: only is_incremental() and boolean literals are allowed")]
    UnsupportedCondition {
        expr: String,
        line: usize,
        column: usize,
    },

    /// T007: Malformed function call arguments
    #[error("[T007] Malformed arguments in '{expr}' at line {line}, column {column}")]
    MalformedArguments {
        expr: String,
        line: usize,
        column: usize,
    },
}

/// Result type alias for TemplateError
pub type TemplateResult<T> = Result<T, TemplateError>;
