//! Sources catalogue
//!
//! Sources are external relations the engine reads but does not manage
//! (tables loaded by upstream pipelines). They are declared in `sources.yml`
//! as groups of tables and resolved to physical identifiers at execution
//! time. The catalogue is immutable within a run.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The `sources.yml` document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<SourceGroup>,
}

/// A group of tables sharing a database/schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceGroup {
    /// Logical group name used by `source('<group>', ...)`
    pub name: String,

    /// Database the tables live in
    #[serde(default)]
    pub database: Option<String>,

    /// Schema the tables live in
    pub schema: String,

    /// Description of the group
    #[serde(default)]
    pub description: Option<String>,

    /// Tables in this group
    #[serde(default)]
    pub tables: Vec<SourceTable>,
}

/// A single table within a source group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTable {
    /// Logical name used by `source(..., '<table>')`
    pub name: String,

    /// Physical table name when it differs from the logical name
    #[serde(default)]
    pub identifier: Option<String>,

    /// Description of the table
    #[serde(default)]
    pub description: Option<String>,
}

/// Catalogue of all declared sources, indexed for resolution
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    groups: BTreeMap<String, SourceGroup>,
}

impl SourceCatalog {
    /// An empty catalogue (projects without external sources)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the catalogue from a `sources.yml` file. A missing file yields an
    /// empty catalogue; a malformed one is an error.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let file: SourcesFile =
            serde_yaml::from_str(&content).map_err(|e| CoreError::SourceParseError {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;

        Self::from_groups(file.sources)
    }

    /// Build a catalogue from parsed groups, rejecting duplicates.
    pub fn from_groups(groups: Vec<SourceGroup>) -> CoreResult<Self> {
        let mut indexed = BTreeMap::new();
        for group in groups {
            if indexed.contains_key(&group.name) {
                return Err(CoreError::SourceDuplicateGroup { name: group.name });
            }
            indexed.insert(group.name.clone(), group);
        }
        Ok(Self { groups: indexed })
    }

    /// Resolve a (group, table) reference to its physical identifier
    /// (`database.schema.table`).
    pub fn resolve(&self, group: &str, table: &str) -> CoreResult<String> {
        let group_def = self
            .groups
            .get(group)
            .ok_or_else(|| CoreError::SourceUnknownGroup {
                group: group.to_string(),
            })?;

        let table_def = group_def
            .tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| CoreError::SourceUnknownTable {
                group: group.to_string(),
                table: table.to_string(),
            })?;

        let identifier = table_def.identifier.as_deref().unwrap_or(&table_def.name);
        Ok(match &group_def.database {
            Some(database) => format!("{}.{}.{}", database, group_def.schema, identifier),
            None => format!("{}.{}", group_def.schema, identifier),
        })
    }

    /// True if the (group, table) pair is declared.
    pub fn contains(&self, group: &str, table: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|g| g.tables.iter().any(|t| t.name == table))
    }

    /// All declared groups, sorted by name.
    pub fn groups(&self) -> impl Iterator<Item = &SourceGroup> {
        self.groups.values()
    }

    /// Number of declared groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when no sources are declared.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
#[path = "sources_test.rs"]
mod tests;
