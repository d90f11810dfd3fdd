//! Per-environment state snapshots
//!
//! The state store is a consumer of truth only: it records what the executor
//! did, it never originates a model. One snapshot file per environment
//! (`state_<env>.json`), written atomically (temp file + rename) so a crash
//! mid-flush leaves the previous snapshot intact. Unknown keys in the file
//! are ignored, keeping snapshots forward- and backward-compatible.

use crate::error::{CoreError, CoreResult};
use crate::model_name::ModelName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Outcome of the most recent run of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// Durable record for one model in one environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    /// Model name
    pub model: ModelName,

    /// Fingerprint of the model at its last run
    pub fingerprint: String,

    /// Status of the last run
    pub status: RunStatus,

    /// Fingerprint of the last run that succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_fingerprint: Option<String>,

    /// When the model last ran
    pub last_run: DateTime<Utc>,

    /// High-watermark for incremental models (timestamp or surrogate key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_watermark: Option<String>,
}

impl StateEntry {
    /// True if the model has ever materialised successfully.
    pub fn previously_materialised(&self) -> bool {
        self.last_successful_fingerprint.is_some()
    }
}

/// A whole environment's snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Environment this snapshot belongs to
    pub environment: String,

    /// When the snapshot was last written
    pub updated_at: DateTime<Utc>,

    /// Per-model entries
    #[serde(default)]
    pub entries: HashMap<ModelName, StateEntry>,
}

impl StateSnapshot {
    /// An empty snapshot for an environment (first run)
    pub fn empty(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            updated_at: Utc::now(),
            entries: HashMap::new(),
        }
    }

    /// Entry for a model, if any
    pub fn get(&self, name: &str) -> Option<&StateEntry> {
        self.entries.get(name)
    }

    /// All recorded model names, sorted
    pub fn names(&self) -> Vec<ModelName> {
        let mut names: Vec<ModelName> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Durable store for one environment's snapshot
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    snapshot: StateSnapshot,
}

impl StateStore {
    /// Open the store for an environment, loading the existing snapshot or
    /// starting empty.
    pub fn open(dir: &Path, environment: &str) -> CoreResult<Self> {
        let path = Self::snapshot_path(dir, environment);
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            })?;
            serde_json::from_str(&content)?
        } else {
            StateSnapshot::empty(environment)
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            snapshot,
        })
    }

    /// Path of the snapshot file for an environment.
    pub fn snapshot_path(dir: &Path, environment: &str) -> PathBuf {
        dir.join(format!("state_{}.json", environment))
    }

    /// The current in-memory snapshot.
    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    /// Entry for a model, if any.
    pub fn get(&self, name: &str) -> Option<&StateEntry> {
        self.snapshot.entries.get(name)
    }

    /// Insert or replace a model's entry.
    pub fn put(&mut self, entry: StateEntry) {
        self.snapshot.entries.insert(entry.model.clone(), entry);
        self.snapshot.updated_at = Utc::now();
    }

    /// Remove a model's entry (after its object was dropped).
    pub fn remove(&mut self, name: &str) -> Option<StateEntry> {
        self.snapshot.updated_at = Utc::now();
        self.snapshot.entries.remove(name)
    }

    /// Write the snapshot atomically: serialise to a PID-suffixed temp file
    /// in the same directory, then rename over the target.
    pub fn flush(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CoreError::IoWithPath {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        let path = Self::snapshot_path(&self.dir, &self.snapshot.environment);
        let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));

        let json = serde_json::to_string_pretty(&self.snapshot)?;
        std::fs::write(&temp_path, &json).map_err(|e| CoreError::IoWithPath {
            path: temp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&temp_path, &path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
