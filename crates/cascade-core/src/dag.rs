//! Dependency graph with batch scheduling
//!
//! Vertices are model names; an edge A -> B means A depends on B. The graph
//! rejects cycles at build time, emits deterministic execution batches
//! (Kahn's algorithm, alphabetical tie-break within a batch), and memoises
//! transitive closures in both directions. Any mutation invalidates both
//! memo tables.

use crate::error::{CoreError, CoreResult};
use crate::model_name::ModelName;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

/// DAG of model -> model dependency edges
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<ModelName, ()>,
    nodes: HashMap<ModelName, NodeIndex>,
    deps_cache: Mutex<HashMap<ModelName, BTreeSet<ModelName>>>,
    dependents_cache: Mutex<HashMap<ModelName, BTreeSet<ModelName>>>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a dependency map, validating that every edge
    /// target is itself a registered model and that no cycle exists.
    pub fn build(dependencies: &BTreeMap<ModelName, BTreeSet<ModelName>>) -> CoreResult<Self> {
        let mut dag = Self::new();

        for name in dependencies.keys() {
            dag.add_vertex(name.as_str());
        }
        for (name, deps) in dependencies {
            for dep in deps {
                if !dependencies.contains_key(dep) {
                    return Err(CoreError::UnknownReference {
                        model: name.to_string(),
                        target: dep.to_string(),
                    });
                }
                dag.add_edge(name.as_str(), dep.as_str());
            }
        }

        dag.validate()?;
        Ok(dag)
    }

    /// Add a vertex if not already present
    pub fn add_vertex(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        self.invalidate();
        let owned = ModelName::new(name);
        let idx = self.graph.add_node(owned.clone());
        self.nodes.insert(owned, idx);
        idx
    }

    /// Add a dependency edge: `from` depends on `to`.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from_idx = self.add_vertex(from);
        let to_idx = self.add_vertex(to);
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.invalidate();
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Remove a vertex and all its edges.
    pub fn remove_vertex(&mut self, name: &str) {
        if let Some(idx) = self.nodes.remove(name) {
            self.invalidate();
            self.graph.remove_node(idx);
        }
    }

    /// True if the model is a vertex
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Number of vertices
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no vertices
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All vertex names, sorted
    pub fn names(&self) -> BTreeSet<ModelName> {
        self.nodes.keys().cloned().collect()
    }

    /// Direct dependencies of a model
    pub fn dependencies(&self, name: &str) -> BTreeSet<ModelName> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Direct dependents of a model
    pub fn dependents(&self, name: &str) -> BTreeSet<ModelName> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> BTreeSet<ModelName> {
        match self.nodes.get(name) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => BTreeSet::new(),
        }
    }

    /// Transitive dependencies of a model (memoised)
    pub fn transitive_deps(&self, name: &str) -> BTreeSet<ModelName> {
        self.transitive(name, Direction::Outgoing, &self.deps_cache)
    }

    /// Transitive dependents of a model (memoised)
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<ModelName> {
        self.transitive(name, Direction::Incoming, &self.dependents_cache)
    }

    fn transitive(
        &self,
        name: &str,
        direction: Direction,
        cache: &Mutex<HashMap<ModelName, BTreeSet<ModelName>>>,
    ) -> BTreeSet<ModelName> {
        if let Ok(guard) = cache.lock() {
            if let Some(hit) = guard.get(name) {
                return hit.clone();
            }
        }

        let mut result = BTreeSet::new();
        if let Some(&start) = self.nodes.get(name) {
            let mut stack: Vec<NodeIndex> =
                self.graph.neighbors_directed(start, direction).collect();
            let mut visited: HashSet<NodeIndex> = stack.iter().copied().collect();

            while let Some(idx) = stack.pop() {
                result.insert(self.graph[idx].clone());
                for next in self.graph.neighbors_directed(idx, direction) {
                    if visited.insert(next) {
                        stack.push(next);
                    }
                }
            }
        }

        if let Ok(mut guard) = cache.lock() {
            guard.insert(ModelName::new(name), result.clone());
        }
        result
    }

    /// Emit execution batches over the whole graph.
    pub fn topological_batches(&self) -> CoreResult<Vec<Vec<ModelName>>> {
        self.topological_batches_for(&self.names())
    }

    /// Emit execution batches restricted to a subset of vertices. Every
    /// model appears after all of its (in-subset) transitive dependencies;
    /// members of one batch are mutually independent. Batches are sorted
    /// alphabetically so output is deterministic.
    pub fn topological_batches_for(
        &self,
        subset: &BTreeSet<ModelName>,
    ) -> CoreResult<Vec<Vec<ModelName>>> {
        let considered: BTreeSet<ModelName> = subset
            .iter()
            .filter(|name| self.nodes.contains_key(name.as_str()))
            .cloned()
            .collect();

        let mut pending: BTreeMap<ModelName, usize> = BTreeMap::new();
        for name in &considered {
            let in_subset_deps = self
                .dependencies(name.as_str())
                .into_iter()
                .filter(|d| considered.contains(d))
                .count();
            pending.insert(name.clone(), in_subset_deps);
        }

        let mut batches: Vec<Vec<ModelName>> = Vec::new();
        let mut emitted: usize = 0;

        while emitted < considered.len() {
            // BTreeMap iteration order gives the alphabetical tie-break
            let ready: Vec<ModelName> = pending
                .iter()
                .filter(|(_, &count)| count == 0)
                .map(|(name, _)| name.clone())
                .collect();

            if ready.is_empty() {
                let remaining: BTreeSet<ModelName> = pending.keys().cloned().collect();
                return Err(CoreError::CircularDependency {
                    cycle: self.find_cycle(&remaining),
                });
            }

            for name in &ready {
                pending.remove(name);
                for dependent in self.dependents(name.as_str()) {
                    if let Some(count) = pending.get_mut(&dependent) {
                        *count -= 1;
                    }
                }
            }

            emitted += ready.len();
            batches.push(ready);
        }

        Ok(batches)
    }

    /// Validate the graph is acyclic.
    pub fn validate(&self) -> CoreResult<()> {
        self.topological_batches().map(|_| ())
    }

    /// Render the graph in Graphviz DOT format (edges dependency -> dependent).
    pub fn to_dot(&self) -> String {
        let mut lines = vec![
            "digraph dependencies {".to_string(),
            "  rankdir=LR;".to_string(),
            "  node [shape=box];".to_string(),
        ];
        for name in self.names() {
            lines.push(format!("  \"{}\";", name));
        }
        for name in self.names() {
            for dep in self.dependencies(name.as_str()) {
                lines.push(format!("  \"{}\" -> \"{}\";", dep, name));
            }
        }
        lines.push("}".to_string());
        lines.join("\n")
    }

    /// Walk dependency edges from the stuck subset until a vertex repeats,
    /// producing a `a -> b -> a` style path for the error message.
    fn find_cycle(&self, remaining: &BTreeSet<ModelName>) -> String {
        let start = match remaining.iter().next() {
            Some(name) => name.clone(),
            None => return String::new(),
        };

        let mut path = vec![start.clone()];
        let mut seen: HashSet<ModelName> = HashSet::new();
        seen.insert(start.clone());
        let mut current = start;

        loop {
            let next = self
                .dependencies(current.as_str())
                .into_iter()
                .find(|d| remaining.contains(d));
            match next {
                Some(next) => {
                    path.push(next.clone());
                    if !seen.insert(next.clone()) {
                        break;
                    }
                    current = next;
                }
                None => break,
            }
        }

        path.iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    fn invalidate(&mut self) {
        if let Ok(mut guard) = self.deps_cache.lock() {
            guard.clear();
        }
        if let Ok(mut guard) = self.dependents_cache.lock() {
            guard.clear();
        }
    }
}

#[cfg(test)]
#[path = "dag_test.rs"]
mod tests;
