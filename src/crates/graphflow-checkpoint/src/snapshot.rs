//! The snapshot wire format: [`Snapshot`], [`GraphShape`], [`ExecutionState`],
//! [`NodeState`].
//!
//! Grounded on `examples/original_source/src/graph/enhanced_graph.py`'s
//! `_create_checkpoint`/`_restore_from_snapshot` methods for capture order and
//! field names. Field names match the documented wire format exactly so
//! `serde_json` round-trips the JSON shape byte-for-byte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// `checkpoint_type` tag carried in a snapshot's `context_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    Initial,
    Auto,
    Final,
    Error,
}

/// One node's declared shape within [`GraphShape`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeShape {
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub status: String,
}

/// One edge within [`GraphShape`]. `condition` mirrors the wire format's name
/// for what the rest of this workspace calls an edge's `action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeShape {
    pub from: String,
    pub to: String,
    pub condition: String,
}

/// Graph topology captured at snapshot time: ids, node type tags, edge
/// triples, start, and terminals. Never used to rebuild a graph — resume
/// assumes the live graph is topologically equivalent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphShape {
    pub name: String,
    pub nodes: HashMap<String, NodeShape>,
    pub edges: Vec<EdgeShape>,
    pub start_node: String,
    pub end_nodes: Vec<String>,
}

/// Execution-context-level state captured at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub current_node: Option<String>,
    pub visited_nodes: Vec<String>,
    pub node_outputs: HashMap<String, Value>,
    pub graph_input: Value,
    pub start_time: DateTime<Utc>,
    /// `"running"` or `"completed"`.
    pub status: String,
}

/// Per-node state captured at snapshot time: status, last result, last input,
/// and the node's own subclass-contributed custom state bag (retry counters,
/// circuit breaker state, buffered join/merge inputs, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub status: String,
    pub result: Option<Value>,
    #[serde(rename = "_input_data")]
    pub input_data: Option<Value>,
    pub custom_state: Value,
}

/// Free-form metadata attached to a snapshot: checkpoint type, sequence
/// number, and any caller-supplied user data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextData {
    pub checkpoint_type: CheckpointType,
    pub checkpoint_number: u64,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// An immutable capture of a graph's shape, execution progress, and per-node
/// state, sufficient for [`crate::traits::CheckpointSaver`] to persist and
/// later restore a run. Snapshots copy by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub graph_id: String,
    pub timestamp: DateTime<Utc>,
    pub graph_structure: GraphShape,
    pub execution_state: ExecutionState,
    pub node_states: HashMap<String, NodeState>,
    pub context_data: ContextData,
}

impl Snapshot {
    pub fn checkpoint_type(&self) -> CheckpointType {
        self.context_data.checkpoint_type
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
