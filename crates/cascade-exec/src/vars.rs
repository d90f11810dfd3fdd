//! `$variable` substitution
//!
//! A single regex pass over the SQL replaces every `$name` token with its
//! formatted value, O(n) in SQL length regardless of how many variables are
//! bound. A referenced variable with no value is a `MissingVariable` error,
//! which aborts the run before any warehouse call.

use crate::error::{ExecError, ExecResult};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("static variable regex is valid")
    })
}

/// Format a variable value as a SQL literal.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Substitute every `$variable` in `sql` from the given bindings.
///
/// Fails on the first referenced variable with no binding.
pub fn substitute_variables(
    sql: &str,
    variables: &BTreeMap<String, Value>,
    model: &str,
) -> ExecResult<String> {
    let re = variable_regex();

    for caps in re.captures_iter(sql) {
        let name = &caps[1];
        if !variables.contains_key(name) {
            return Err(ExecError::MissingVariable {
                name: name.to_string(),
                model: model.to_string(),
            });
        }
    }

    let substituted = re.replace_all(sql, |caps: &regex::Captures<'_>| {
        // Presence checked above
        variables
            .get(&caps[1])
            .map(format_value)
            .unwrap_or_else(|| caps[0].to_string())
    });

    Ok(substituted.into_owned())
}

/// Check that every variable a model declares has a binding, whether or not
/// the SQL currently references it.
pub fn validate_declared(
    declared: &[String],
    variables: &BTreeMap<String, Value>,
    model: &str,
) -> ExecResult<()> {
    for name in declared {
        if !variables.contains_key(name) {
            return Err(ExecError::MissingVariable {
                name: name.clone(),
                model: model.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "vars_test.rs"]
mod tests;
