//! # graphflow-core — a typed, resumable, concurrent graph execution engine
//!
//! `graphflow-core` runs a directed multigraph of three-phase nodes
//! (`prep -> exec -> post`) to completion, dispatching on the routing
//! decision each node's `post` returns. Nodes fall into three categories:
//!
//! - **Task** nodes ([`task::TaskNode`]) wrap a pure `input -> output` function.
//! - **Control** nodes ([`control`]) implement the five atomic control-flow
//!   primitives: Sequence, Branch, Merge, Fork, Join.
//! - **Exception** nodes ([`exception`]) wrap a target with a recovery
//!   policy — TryCatch, Retry, Timeout, CircuitBreaker — and always succeed
//!   at the engine level, routing on a reserved `next_action` instead of
//!   propagating.
//!
//! [`graph::Graph`] owns the nodes and their labeled edges and validates its
//! own shape; [`executor::GraphExecutor`] drains a ready-queue from the
//! graph's start node to completion, collating fan-in at Join nodes and
//! firing `before_node`/`after_node`/`on_error`/`on_complete` hooks along the
//! way. [`context::ExecutionContext`] is the run-scoped state the executor
//! builds up; [`yaml::GraphDef`] is the declarative (YAML/JSON) description
//! a [`graph::Graph`] can be built from or serialized back to. Snapshotting
//! and resume live in the sibling `graphflow-checkpoint` crate, re-exported
//! here as [`checkpoint`].
//!
//! ```
//! use graphflow_core::{Graph, GraphExecutor, TaskNode};
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = Graph::new("double-then-stringify");
//! graph.add_node(Box::new(TaskNode::new(
//!     "double",
//!     "double",
//!     Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) * 2))),
//! )))?;
//! graph.add_node(Box::new(TaskNode::new(
//!     "stringify",
//!     "stringify",
//!     Arc::new(|v: Value| Ok(Value::String(v.to_string()))),
//! )))?;
//! graph.add_edge("double", "stringify", "default", 1.0)?;
//! graph.set_start("double")?;
//! graph.add_end("stringify")?;
//!
//! let ctx = GraphExecutor::new().execute(&mut graph, Value::from(21)).await?;
//! assert_eq!(ctx.graph_output(), Some(&Value::String("42".to_string())));
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod control;
pub mod error;
pub mod exception;
pub mod executor;
pub mod graph;
pub mod node;
pub mod task;
pub mod yaml;

/// Re-export of the sibling snapshot/resume crate, so callers configuring a
/// [`executor::GraphExecutor`] with a [`checkpoint::CheckpointSaver`] don't
/// need a separate `graphflow-checkpoint` dependency line.
pub use graphflow_checkpoint as checkpoint;

pub use context::{ExecutionContext, ExecutionRecord};
pub use control::{
    BranchControlNode, CombineFn, ForkControlNode, JoinControlNode, MergeControlNode,
    PredicateFn, SequenceControlNode, SequenceFn,
};
pub use error::{GraphflowError, Result};
pub use exception::{
    CircuitBreakerNode, CircuitState, ExceptionFilter, RetryNode, TargetFn, TimeoutNode,
    TryCatchNode,
};
pub use executor::{GraphExecutor, HookEvent, HookRegistry, PauseHandle};
pub use graph::{Edge, Graph, Severity, ValidationIssue, ValidationReport};
pub use node::{sentinel, ControlKind, ExecError, Node, NodeCategory, NodeCore, NodeStatus};
pub use task::{TaskFn, TaskNode};
pub use yaml::GraphDef;
