//! Plan generation
//!
//! The planner diffs the registry against the environment's state snapshot
//! and classifies every model, then lays the models to execute into
//! dependency-ordered batches. Plan construction is pure: no warehouse
//! calls, no state writes.

use crate::dag::DependencyGraph;
use crate::error::{CoreError, CoreResult};
use crate::model_name::ModelName;
use crate::registry::ModelRegistry;
use crate::state::StateSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Why a model is (or is not) part of the execution set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeReason {
    /// No state entry exists for the model
    New,
    /// The fingerprint differs from the last successful run
    CodeChanged,
    /// A transitive dependency is new, changed, or forced
    UpstreamChanged,
    /// Explicitly forced by the caller
    Forced,
    /// Up to date; not executed
    Unchanged,
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeReason::New => "NEW",
            ChangeReason::CodeChanged => "CODE_CHANGED",
            ChangeReason::UpstreamChanged => "UPSTREAM_CHANGED",
            ChangeReason::Forced => "FORCED",
            ChangeReason::Unchanged => "UNCHANGED",
        };
        f.write_str(s)
    }
}

/// One model's classification in a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelChange {
    pub model: ModelName,
    pub reason: ChangeReason,
}

/// Counts per classification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    pub new: usize,
    pub code_changed: usize,
    pub upstream_changed: usize,
    pub forced: usize,
    pub unchanged: usize,
    pub deletions: usize,
}

/// An ordered execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Environment the plan was computed against
    pub environment: String,

    /// When the plan was computed
    pub created_at: DateTime<Utc>,

    /// Per-model classifications, sorted by name. Unchanged models appear
    /// only when the plan was built with `include_unchanged`.
    pub changes: Vec<ModelChange>,

    /// Batches to execute, in order; members of a batch are independent
    pub batches: Vec<Vec<ModelName>>,

    /// Models present in state but gone from the registry; their objects are
    /// dropped in a terminal batch after all executions succeed
    pub deletions: Vec<ModelName>,
}

impl Plan {
    /// True when there is nothing to execute or delete.
    pub fn is_noop(&self) -> bool {
        self.batches.is_empty() && self.deletions.is_empty()
    }

    /// Every model in the execution set, in batch order.
    pub fn models_to_execute(&self) -> Vec<ModelName> {
        self.batches.iter().flatten().cloned().collect()
    }

    /// The classification of one model, if it appears in the plan.
    pub fn reason_of(&self, name: &str) -> Option<ChangeReason> {
        self.changes
            .iter()
            .find(|c| c.model == name)
            .map(|c| c.reason)
    }

    /// Aggregate counts.
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            deletions: self.deletions.len(),
            ..PlanSummary::default()
        };
        for change in &self.changes {
            match change.reason {
                ChangeReason::New => summary.new += 1,
                ChangeReason::CodeChanged => summary.code_changed += 1,
                ChangeReason::UpstreamChanged => summary.upstream_changed += 1,
                ChangeReason::Forced => summary.forced += 1,
                ChangeReason::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Serialise the plan as pretty JSON.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Options controlling plan construction
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Restrict planning to these models plus their transitive dependencies
    pub filter: Option<BTreeSet<ModelName>>,

    /// Models to execute even when unchanged
    pub forced: BTreeSet<ModelName>,

    /// Keep UNCHANGED entries in the change list (dry-run inspection)
    pub include_unchanged: bool,
}

/// Computes plans from registry + graph + state
pub struct Planner<'a> {
    registry: &'a ModelRegistry,
    graph: &'a DependencyGraph,
    state: &'a StateSnapshot,
}

impl<'a> Planner<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        graph: &'a DependencyGraph,
        state: &'a StateSnapshot,
    ) -> Self {
        Self {
            registry,
            graph,
            state,
        }
    }

    /// Build a plan.
    pub fn build(&self, options: &PlanOptions) -> CoreResult<Plan> {
        let candidates = self.candidate_set(options)?;

        // First pass: classify each model against its own state entry
        let mut reasons: BTreeMap<ModelName, ChangeReason> = BTreeMap::new();
        for name in &candidates {
            let model = self.registry.get(name.as_str())?;
            let reason = match self.state.get(name.as_str()) {
                None => ChangeReason::New,
                Some(entry) => {
                    if entry.last_successful_fingerprint.as_deref() != Some(&model.fingerprint) {
                        ChangeReason::CodeChanged
                    } else {
                        ChangeReason::Unchanged
                    }
                }
            };
            reasons.insert(name.clone(), reason);
        }

        // Models that make their dependents stale
        let changed_base: BTreeSet<ModelName> = candidates
            .iter()
            .filter(|name| {
                matches!(
                    reasons.get(*name),
                    Some(ChangeReason::New | ChangeReason::CodeChanged)
                ) || options.forced.contains(*name)
            })
            .cloned()
            .collect();

        // Second pass: propagate staleness, then apply the forced set
        for name in &candidates {
            let current = reasons[name];
            if current != ChangeReason::Unchanged {
                continue;
            }
            let upstream_changed = self
                .graph
                .transitive_deps(name.as_str())
                .iter()
                .any(|dep| changed_base.contains(dep));
            if upstream_changed {
                reasons.insert(name.clone(), ChangeReason::UpstreamChanged);
            } else if options.forced.contains(name) {
                reasons.insert(name.clone(), ChangeReason::Forced);
            }
        }

        let execute_set: BTreeSet<ModelName> = reasons
            .iter()
            .filter(|(_, &reason)| reason != ChangeReason::Unchanged)
            .map(|(name, _)| name.clone())
            .collect();

        let batches = self.graph.topological_batches_for(&execute_set)?;

        // Deletions only apply to full plans; a filtered run must not drop
        // models it was never asked to look at
        let deletions: Vec<ModelName> = if options.filter.is_none() {
            let registered = self.registry.names();
            self.state
                .names()
                .into_iter()
                .filter(|name| !registered.contains(name))
                .collect()
        } else {
            Vec::new()
        };

        let changes: Vec<ModelChange> = reasons
            .into_iter()
            .filter(|(_, reason)| options.include_unchanged || *reason != ChangeReason::Unchanged)
            .map(|(model, reason)| ModelChange { model, reason })
            .collect();

        Ok(Plan {
            environment: self.state.environment.clone(),
            created_at: Utc::now(),
            changes,
            batches,
            deletions,
        })
    }

    /// The set of models under consideration: the whole registry, or the
    /// filter plus its transitive dependencies.
    fn candidate_set(&self, options: &PlanOptions) -> CoreResult<BTreeSet<ModelName>> {
        match &options.filter {
            None => Ok(self.registry.names()),
            Some(filter) => {
                let mut candidates = BTreeSet::new();
                for name in filter {
                    if !self.registry.contains(name.as_str()) {
                        return Err(CoreError::ModelNotFound {
                            name: name.to_string(),
                        });
                    }
                    candidates.insert(name.clone());
                    candidates.extend(self.graph.transitive_deps(name.as_str()));
                }
                Ok(candidates)
            }
        }
    }
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
