//! Per-run mutable state: [`ExecutionContext`].
//!
//! Grounded on `examples/original_source/src/graph/core.py`'s `ExecutionContext`
//! and on `managed::ExecutionContext` for the shape of a
//! run-scoped, executor-owned state bag (shared user-data map, timestamps).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One entry in an [`ExecutionContext`]'s history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub input: Value,
    pub result: Value,
    pub action: Option<String>,
    pub error: Option<String>,
}

/// Per-run state owned exclusively by the [`crate::executor::GraphExecutor`]:
/// the traversed path, the visited set, last input/output per node, the full
/// execution history, timestamps, and a free-form user-data bag. Mutated only
/// through [`ExecutionContext::add_execution`] and [`ExecutionContext::finish`]
/// — these are the sole mutators reachable from the executor
/// loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    path: Vec<String>,
    visited: Vec<String>,
    node_inputs: HashMap<String, Value>,
    node_outputs: HashMap<String, Value>,
    history: Vec<ExecutionRecord>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    user_data: HashMap<String, Value>,
    graph_input: Value,
    current_node: Option<String>,
    /// `true` once the run has drained, hit a terminal, or hit the ceiling.
    completed: bool,
    /// Non-fatal warnings surfaced during the run (join starvation at drain,
    /// iteration ceiling exceeded, …) — recorded rather than raised.
    diagnostics: Vec<String>,
}

impl ExecutionContext {
    /// Begin a new context at `now` with the graph's initial input recorded.
    pub fn new(now: DateTime<Utc>, graph_input: Value) -> Self {
        ExecutionContext {
            path: Vec::new(),
            visited: Vec::new(),
            node_inputs: HashMap::new(),
            node_outputs: HashMap::new(),
            history: Vec::new(),
            start_time: now,
            end_time: None,
            user_data: HashMap::new(),
            graph_input,
            current_node: None,
            completed: false,
            diagnostics: Vec::new(),
        }
    }

    /// Rebuild a context from a snapshot's captured execution state. `path`
    /// and per-node inputs aren't part of the wire format, so they
    /// start empty; `visited_nodes` and `node_outputs` carry over directly.
    pub fn from_snapshot(state: &graphflow_checkpoint::ExecutionState) -> Self {
        ExecutionContext {
            path: state.visited_nodes.clone(),
            visited: state.visited_nodes.clone(),
            node_inputs: HashMap::new(),
            node_outputs: state.node_outputs.clone(),
            history: Vec::new(),
            start_time: state.start_time,
            end_time: None,
            user_data: HashMap::new(),
            graph_input: state.graph_input.clone(),
            current_node: state.current_node.clone(),
            completed: state.status == "completed",
            diagnostics: Vec::new(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn has_visited(&self, id: &str) -> bool {
        self.visited.iter().any(|v| v == id)
    }

    pub fn node_input(&self, id: &str) -> Option<&Value> {
        self.node_inputs.get(id)
    }

    pub fn node_output(&self, id: &str) -> Option<&Value> {
        self.node_outputs.get(id)
    }

    pub fn node_outputs(&self) -> &HashMap<String, Value> {
        &self.node_outputs
    }

    pub fn history(&self) -> &[ExecutionRecord] {
        &self.history
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn graph_input(&self) -> &Value {
        &self.graph_input
    }

    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn user_data(&self) -> &HashMap<String, Value> {
        &self.user_data
    }

    pub fn set_user_data(&mut self, key: impl Into<String>, value: Value) {
        self.user_data.insert(key.into(), value);
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn add_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }

    /// Duration since `start_time`; against `end_time` if finished, otherwise
    /// against `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }

    /// The only mutator called from inside the executor loop: records a
    /// node's invocation in history, updates path/visited/io maps, and tracks
    /// the current node for snapshotting.
    pub fn add_execution(
        &mut self,
        now: DateTime<Utc>,
        node_id: impl Into<String>,
        input: Value,
        result: Value,
        action: Option<String>,
        error: Option<String>,
    ) {
        let node_id = node_id.into();
        self.path.push(node_id.clone());
        if !self.has_visited(&node_id) {
            self.visited.push(node_id.clone());
        }
        self.node_inputs.insert(node_id.clone(), input.clone());
        if error.is_none() {
            self.node_outputs.insert(node_id.clone(), result.clone());
        }
        self.current_node = Some(node_id.clone());
        self.history.push(ExecutionRecord {
            node_id,
            timestamp: now,
            input,
            result,
            action,
            error,
        });
    }

    /// Mark the run finished at `now`.
    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.completed = true;
    }

    /// The result of the last successful node in history, used as the run's
    /// output when no explicit terminal node was reached.
    pub fn graph_output(&self) -> Option<&Value> {
        self.history
            .iter()
            .rev()
            .find(|r| r.error.is_none())
            .map(|r| &r.result)
    }
}
