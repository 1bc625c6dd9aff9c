//! The directed multigraph: [`Edge`], [`Graph`], and [`ValidationReport`].
//!
//! Grounded on `examples/original_source/src/graph/core.py`'s `Graph` class for
//! the core operations (`add_node`/`add_edge`/`remove_*`/`has_path`/`all_paths`/
//! `detect_cycles`/`topological_order`) and on `graph_validator.py` for the
//! extended, warning-level checks folded into [`Graph::validate`].
//! Edges are keyed `from -> (action -> Edge)` using an
//! [`indexmap::IndexMap`] rather than a `HashMap` because dispatch
//! requires insertion order to be observable (Fork iteration order, tie-breaking
//! on duplicate action labels).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::error::{GraphflowError, Result};
use crate::node::Node;

/// A directed arc `from -> to` labeled with an `action` and a numeric weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub action: String,
    pub weight: f64,
}

/// Severity of a [`ValidationReport`] entry. Only `Error` makes
/// [`ValidationReport::ok`] false; `Warning` entries are diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// One entry in a [`ValidationReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

/// The result of [`Graph::validate`]: structural invariants as `Error`
/// entries, richer shape checks as `Warning` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn error(&mut self, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Error,
            message: message.into(),
        });
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    /// `true` iff no `Error`-severity issues were recorded. Matches
    /// `validate() -> (ok, [errorString])` — `ok` here is this method, and the
    /// error strings are `self.errors()`.
    pub fn ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.message.as_str())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .map(|i| i.message.as_str())
    }
}

/// The typed multigraph. Owns its nodes for their entire lifetime; a
/// [`crate::executor::GraphExecutor`] borrows them for the duration of a run.
pub struct Graph {
    name: String,
    nodes: IndexMap<String, Box<dyn Node>>,
    outgoing: IndexMap<String, IndexMap<String, Edge>>,
    start: Option<String>,
    ends: HashSet<String>,
    /// `(from, action)` pairs where a later [`Graph::add_edge`] call
    /// overwrote an earlier edge stored under the same key. `outgoing`'s
    /// keys are unique by construction, so this is the only place the
    /// condition is still observable once construction is done.
    overwritten_edge_keys: Vec<(String, String)>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Graph {
            name: name.into(),
            nodes: IndexMap::new(),
            outgoing: IndexMap::new(),
            start: None,
            ends: HashSet::new(),
            overwritten_edge_keys: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(|m| m.len()).sum()
    }

    /// Insert a node. Duplicate ids are an error, matching the Python
    /// original's `add_node`.
    pub fn add_node(&mut self, node: Box<dyn Node>) -> Result<()> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(GraphflowError::Validation(format!(
                "node '{id}' already exists"
            )));
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<&dyn Node> {
        self.nodes.get(id).map(|n| n.as_ref())
    }

    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut Box<dyn Node>> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Add `from -(action)-> to`. Replaces any edge previously stored under the
    /// same `(from, action)` key. Notifies `to`
    /// of its new incoming degree via [`Node::set_incoming_degree`].
    pub fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        action: impl Into<String>,
        weight: f64,
    ) -> Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(GraphflowError::Validation(format!(
                "edge source '{from}' does not exist"
            )));
        }
        if !self.nodes.contains_key(to) {
            return Err(GraphflowError::Validation(format!(
                "edge target '{to}' does not exist"
            )));
        }
        let action = action.into();
        let edge = Edge {
            from: from.to_string(),
            to: to.to_string(),
            action: action.clone(),
            weight,
        };
        let replaced = self
            .outgoing
            .entry(from.to_string())
            .or_default()
            .insert(action.clone(), edge)
            .is_some();
        if replaced {
            tracing::debug!(from, action = %action, "replaced existing edge for (from, action)");
            self.overwritten_edge_keys.push((from.to_string(), action));
        }

        let degree = self.incoming(to).len();
        if let Some(node) = self.nodes.get_mut(to) {
            node.set_incoming_degree(degree);
        }
        Ok(())
    }

    pub fn remove_edge(&mut self, from: &str, action: &str) {
        if let Some(actions) = self.outgoing.get_mut(from) {
            if let Some(removed) = actions.shift_remove(action) {
                let degree = self.incoming(&removed.to).len();
                if let Some(node) = self.nodes.get_mut(&removed.to) {
                    node.set_incoming_degree(degree);
                }
            }
        }
    }

    /// Remove a node and cascade: every edge touching it is dropped, and it is
    /// unset as start/terminal if applicable.
    pub fn remove_node(&mut self, id: &str) {
        self.nodes.shift_remove(id);
        self.outgoing.shift_remove(id);
        for actions in self.outgoing.values_mut() {
            actions.retain(|_, e| e.to != id);
        }
        if self.start.as_deref() == Some(id) {
            self.start = None;
        }
        self.ends.remove(id);
    }

    pub fn set_start(&mut self, id: &str) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(GraphflowError::Validation(format!(
                "cannot set start to unknown node '{id}'"
            )));
        }
        self.start = Some(id.to_string());
        Ok(())
    }

    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn add_end(&mut self, id: &str) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(GraphflowError::Validation(format!(
                "cannot mark unknown node '{id}' as terminal"
            )));
        }
        self.ends.insert(id.to_string());
        Ok(())
    }

    pub fn is_terminal(&self, id: &str) -> bool {
        self.ends.contains(id)
    }

    pub fn ends(&self) -> impl Iterator<Item = &str> {
        self.ends.iter().map(|s| s.as_str())
    }

    /// Outgoing edges of `id`, in insertion order.
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        self.outgoing
            .get(id)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    /// Look up the outgoing edge for `id` labeled `action`.
    pub fn edge_for_action(&self, id: &str, action: &str) -> Option<&Edge> {
        self.outgoing.get(id).and_then(|m| m.get(action))
    }

    /// Incoming edges of `id`. Computed by scanning, rather than maintained as
    /// a second index, to keep `add_edge`/`remove_edge`/`remove_node` simple
    /// and free of index-desync bugs; graphs in this engine's domain are small
    /// enough that this is not a hot path.
    pub fn incoming(&self, id: &str) -> Vec<&Edge> {
        self.outgoing
            .values()
            .flat_map(|m| m.values())
            .filter(|e| e.to == id)
            .collect()
    }

    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        self.outgoing(id).into_iter().map(|e| e.to.as_str()).collect()
    }

    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.incoming(id).into_iter().map(|e| e.from.as_str()).collect()
    }

    /// BFS reachability.
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([from.to_string()]);
        visited.insert(from.to_string());
        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing(&current) {
                if edge.to == to {
                    return true;
                }
                if visited.insert(edge.to.clone()) {
                    queue.push_back(edge.to.clone());
                }
            }
        }
        false
    }

    /// DFS enumeration of all acyclic simple paths `from -> to`.
    pub fn all_paths(&self, from: &str, to: &str) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        let mut stack = vec![from.to_string()];
        self.dfs_paths(from, to, &mut stack, &mut paths);
        paths
    }

    fn dfs_paths(&self, current: &str, to: &str, stack: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        if current == to {
            out.push(stack.clone());
            return;
        }
        for edge in self.outgoing(current) {
            if stack.contains(&edge.to) {
                continue;
            }
            stack.push(edge.to.clone());
            self.dfs_paths(&edge.to, to, stack, out);
            stack.pop();
        }
    }

    /// All simple cycles, found via DFS back-edge detection. Loops are
    /// permitted — this is a diagnostic, not a
    /// precondition for execution.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut visited = HashSet::new();
        for id in self.nodes.keys() {
            if !visited.contains(id) {
                self.dfs_cycles(id, &mut path, &mut on_path, &mut visited, &mut cycles);
            }
        }
        cycles
    }

    fn dfs_cycles(
        &self,
        node: &str,
        path: &mut Vec<String>,
        on_path: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node.to_string());
        path.push(node.to_string());
        on_path.insert(node.to_string());

        for edge in self.outgoing(node) {
            if on_path.contains(&edge.to) {
                let start_idx = path.iter().position(|n| n == &edge.to).unwrap();
                cycles.push(path[start_idx..].to_vec());
            } else if !visited.contains(&edge.to) {
                self.dfs_cycles(&edge.to, path, on_path, visited, cycles);
            }
        }

        path.pop();
        on_path.remove(node);
    }

    /// Kahn's algorithm. `Err` if the graph is cyclic — only call this when the
    /// caller has asserted acyclicity.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: IndexMap<&str, usize> =
            self.nodes.keys().map(|k| (k.as_str(), 0)).collect();
        for actions in self.outgoing.values() {
            for edge in actions.values() {
                *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<String> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.to_string())
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            for edge in self.outgoing(&id) {
                let deg = in_degree.get_mut(edge.to.as_str()).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(edge.to.clone());
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphflowError::Validation(
                "graph is cyclic; no topological order exists".to_string(),
            ));
        }
        Ok(order)
    }

    /// The structural invariants as errors, plus the richer shape
    /// warning-level checks recovered from `graph_validator.py`.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        match &self.start {
            None => report.error("no start node set"),
            Some(start) if !self.nodes.contains_key(start) => {
                report.error(format!("start node '{start}' does not exist"))
            }
            _ => {}
        }

        for end in &self.ends {
            if !self.nodes.contains_key(end) {
                report.error(format!("terminal node '{end}' does not exist"));
            }
        }

        for actions in self.outgoing.values() {
            for edge in actions.values() {
                if !self.nodes.contains_key(&edge.to) {
                    report.error(format!(
                        "edge {} -> {} targets a node that does not exist",
                        edge.from, edge.to
                    ));
                }
            }
        }

        let reachable_from_start = self.start.as_ref().and_then(|start| {
            if !self.nodes.contains_key(start) {
                return None;
            }
            let mut reachable = HashSet::new();
            let mut queue = VecDeque::from([start.clone()]);
            reachable.insert(start.clone());
            while let Some(current) = queue.pop_front() {
                for edge in self.outgoing(&current) {
                    if reachable.insert(edge.to.clone()) {
                        queue.push_back(edge.to.clone());
                    }
                }
            }
            Some(reachable)
        });

        if let Some(reachable) = &reachable_from_start {
            for id in self.nodes.keys() {
                if !reachable.contains(id) {
                    report.error(format!("node '{id}' is not reachable from start"));
                }
            }
        }

        for id in self.nodes.keys() {
            let has_outgoing = self.outgoing.get(id).map(|m| !m.is_empty()).unwrap_or(false);
            if !has_outgoing && !self.ends.contains(id) {
                report.error(format!(
                    "node '{id}' has no outgoing edges and is not a terminal node"
                ));
            }
        }

        for (id, node) in &self.nodes {
            if node.control_kind() == Some(crate::node::ControlKind::Branch) {
                let edges = self.outgoing(id);
                let distinct_actions: HashSet<&str> =
                    edges.iter().map(|e| e.action.as_str()).collect();
                if edges.len() < 2 || distinct_actions.len() < 2 {
                    report.error(format!(
                        "branch node '{id}' must have >=2 outgoing edges with >=2 distinct action labels"
                    ));
                }
            }
        }

        for (from, action) in &self.overwritten_edge_keys {
            report.warning(format!(
                "duplicate edge key ('{from}', '{action}') detected: a later add_edge call overwrote an earlier edge stored under the same key"
            ));
        }

        for (id, node) in &self.nodes {
            if node.control_kind() == Some(crate::node::ControlKind::Fork) {
                let declared = node
                    .control_param_hint()
                    .and_then(|h| h.get("fork_count").and_then(|v| v.as_u64()))
                    .unwrap_or(0) as usize;
                let actual = self.outgoing(id).len();
                if declared != actual {
                    report.warning(format!(
                        "fork node '{id}' declares fork_count={declared} but has {actual} outgoing edges"
                    ));
                }
            }
            if matches!(
                node.control_kind(),
                Some(crate::node::ControlKind::Join) | Some(crate::node::ControlKind::Merge)
            ) && self.incoming(id).len() < 2
            {
                report.warning(format!(
                    "join/merge node '{id}' has fewer than 2 incoming edges"
                ));
            }
        }

        for id in self.nodes.keys() {
            let isolated = self.outgoing.get(id).map(|m| m.is_empty()).unwrap_or(true)
                && self.incoming(id).is_empty()
                && self.start.as_deref() != Some(id.as_str());
            if isolated {
                report.warning(format!("node '{id}' is isolated (no incoming or outgoing edges)"));
            }
        }

        if let Some(reachable) = &reachable_from_start {
            if !self.ends.is_empty() {
                for id in reachable {
                    if self.ends.contains(id) {
                        continue;
                    }
                    let can_reach_end = self.ends.iter().any(|end| self.has_path(id, end));
                    if !can_reach_end {
                        report.warning(format!(
                            "node '{id}' is reachable from start but cannot reach any terminal node"
                        ));
                    }
                }
            }
        }

        let cycles = self.detect_cycles();
        if !cycles.is_empty() {
            report.warning(format!(
                "graph contains {} cycle(s); permitted as loops but reported for diagnostics",
                cycles.len()
            ));
        }

        report
    }
}
