//! Leading comment header extraction
//!
//! Model SQL files may start with a comment block carrying configuration and
//! explicit extra dependencies:
//!
//! ```sql
//! -- config: materialized=incremental, unique_key=order_id
//! -- depends_on: silver.customers, silver.products
//! SELECT ...
//! ```
//!
//! Only the leading comment block (comments and blank lines before the first
//! SQL token) is scanned. These lines are stripped from the expanded SQL.

use std::collections::BTreeMap;

/// Parsed leading comment header of a model file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    /// Key/value pairs from `-- config:` lines
    pub config: BTreeMap<String, String>,

    /// Model names from `-- depends_on:` lines
    pub depends_on: Vec<String>,
}

/// Extract the header from raw model SQL.
///
/// Pairs without an `=` and empty entries are skipped. Repeated keys keep the
/// last occurrence. Lines that are comments but neither directive are left
/// alone (they stay in the SQL body).
pub fn extract_header(sql: &str) -> Header {
    let mut header = Header::default();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with("--") {
            // First SQL token ends the leading block
            break;
        }

        let comment = trimmed.trim_start_matches('-').trim_start();
        if let Some(rest) = comment.strip_prefix("config:") {
            for pair in rest.split(',') {
                if let Some((key, value)) = pair.split_once('=') {
                    let key = key.trim();
                    let value = value.trim();
                    if !key.is_empty() {
                        header.config.insert(key.to_string(), value.to_string());
                    }
                }
            }
        } else if let Some(rest) = comment.strip_prefix("depends_on:") {
            for dep in rest.split(',') {
                let dep = dep.trim();
                if !dep.is_empty() && !header.depends_on.iter().any(|d| d == dep) {
                    header.depends_on.push(dep.to_string());
                }
            }
        }
    }

    header
}

/// Return true if a line is a header directive that should not be emitted.
pub(crate) fn is_directive_line(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with("--") {
        return false;
    }
    let comment = trimmed.trim_start_matches('-').trim_start();
    comment.starts_with("config:") || comment.starts_with("depends_on:")
}
