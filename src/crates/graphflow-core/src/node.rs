//! The node lifecycle contract: [`NodeStatus`], [`NodeCategory`], and the [`Node`]
//! trait itself.
//!
//! Grounded on `examples/original_source/src/graph/core.py`'s `BaseNode.run()` and
//! `node_types.py`'s category split, re-expressed as a capability trait rather than
//! an inheritance hierarchy per the "dynamic dispatch over node categories" design
//! note: the executor only ever calls through [`Node`]; it never downcasts to a
//! concrete type, and it learns about fork/join/branch routing from the shape
//! of a node's raw `exec` result, not from a category check (see
//! [`crate::executor`]'s module docs for the dispatch rule).

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error as StdError;

/// Sentinel strings a node's [`Node::post`] may return in place of an edge's
/// `action` label. See module docs on [`crate::executor`] for how the executor
/// interprets each one.
pub mod sentinel {
    /// Activate every outgoing edge with the same payload.
    pub const FORK: &str = "__fork__";
    /// The node is buffering input; do not enqueue successors yet.
    pub const WAITING: &str = "__waiting__";
    /// Halt traversal of this branch immediately.
    pub const EXIT: &str = "__exit__";
    /// Route to the edge labeled `error`, or propagate if none exists.
    pub const ERROR: &str = "error";
    /// The implicit default when `post` returns `None`.
    pub const DEFAULT: &str = "default";
}

/// Lifecycle status of a node within a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    /// Not yet invoked this run.
    Pending,
    /// `prep`/`exec`/`post` are in flight.
    Running,
    /// `exec` returned normally and `post` ran.
    Success,
    /// `prep`, `exec`, or `post` returned an error.
    Failed,
    /// Not invoked because an upstream condition skipped this branch.
    Skipped,
}

/// The taxonomy a node belongs to. Carried for introspection, validation, and
/// snapshotting; the executor's dispatch logic never branches on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeCategory {
    /// Wraps a pure function; default `post` takes the first outgoing edge.
    Task,
    /// Computes a routing decision (Sequence, Branch, Merge, Fork, Join).
    Control,
    /// Wraps a target with a recovery policy (TryCatch, Retry, Timeout, CircuitBreaker).
    Exception,
}

/// Shared mutable state every concrete node embeds. There is no base class to
/// inherit from — each node type holds a `NodeCore` field and implements
/// [`Node::core`]/[`Node::core_mut`] to expose it, which is how `run()`'s default
/// implementation gets at status/result/error/input without knowing the concrete
/// node type.
#[derive(Debug, Clone)]
pub struct NodeCore {
    id: String,
    name: String,
    category: NodeCategory,
    status: NodeStatus,
    last_result: Option<Value>,
    last_error: Option<String>,
    input: Option<Value>,
}

impl NodeCore {
    /// Create a fresh, `Pending` node core.
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: NodeCategory) -> Self {
        let id = id.into();
        let name_s = name.into();
        NodeCore {
            name: if name_s.is_empty() { id.clone() } else { name_s },
            id,
            category,
            status: NodeStatus::Pending,
            last_result: None,
            last_error: None,
            input: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> NodeCategory {
        self.category
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn last_result(&self) -> Option<&Value> {
        self.last_result.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    /// Take the scratch input, leaving `None` behind — called once per invocation
    /// by `exec` implementations that need owned access.
    pub fn take_input(&mut self) -> Value {
        self.input.take().unwrap_or(Value::Null)
    }

    pub fn set_input(&mut self, input: Value) {
        self.input = Some(input);
    }

    pub fn reset(&mut self) {
        self.status = NodeStatus::Pending;
        self.last_result = None;
        self.last_error = None;
        self.input = None;
    }

    /// Overwrite status/result/input directly from a checkpoint's captured
    /// per-node state during resume. Bypasses `run()` entirely — this is
    /// restoration, not execution.
    pub fn restore(&mut self, status: NodeStatus, last_result: Option<Value>, input: Option<Value>) {
        self.status = status;
        self.last_result = last_result;
        self.input = input;
    }
}

/// Boxed error type exec implementations return; any `std::error::Error` converts
/// via `?` through `From`.
pub type ExecError = Box<dyn StdError + Send + Sync>;

/// Which atomic control-flow node a [`NodeCategory::Control`] node is. Exposed
/// so [`crate::graph::Graph::validate`] can run the shape checks from
/// `graph_validator.py` (e.g. "Branch needs >=2 distinct outgoing labels")
/// without downcasting to a concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Sequence,
    Branch,
    Merge,
    Fork,
    Join,
}

/// The three-phase lifecycle contract: `prep` -> `exec` -> `post`. Implementors embed
/// a [`NodeCore`] and expose it via `core`/`core_mut`; the default [`Node::run`]
/// method drives `prep -> exec -> post` and handles status transitions, so
/// concrete node types only need to implement the three phases themselves.
#[async_trait]
pub trait Node: Send + Sync {
    /// Shared state accessor (id, name, status, last result/error, scratch input).
    fn core(&self) -> &NodeCore;
    /// Mutable shared state accessor.
    fn core_mut(&mut self) -> &mut NodeCore;

    /// Side-effect-free initialization for this invocation. Default is a no-op;
    /// most node types never need to override it.
    async fn prep(&mut self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Pure core computation. Returns the value stored as this invocation's result.
    async fn exec(&mut self) -> Result<Value, ExecError>;

    /// Returns a routing decision: `None` means "take the default outgoing edge";
    /// `Some(label)` is either a literal edge action or one of the sentinels in
    /// [`sentinel`].
    async fn post(&mut self) -> Option<String>;

    /// Subclass-contributed snapshot state (retry attempt counts, circuit breaker
    /// state, buffered join/merge inputs, …). Default is `Value::Null`, meaning
    /// "nothing beyond `NodeCore` to capture".
    fn custom_state(&self) -> Value {
        Value::Null
    }

    /// Restore subclass-contributed state captured by [`Node::custom_state`].
    /// Default is a no-op; node types with no custom state never need to override.
    fn restore_custom_state(&mut self, _state: Value) {}

    /// Reset to `Pending` and clear scratch slots. Node types with extra buffered
    /// state (Merge, Join, CircuitBreaker) override this to also clear it.
    fn reset(&mut self) {
        self.core_mut().reset();
    }

    /// Called by [`crate::graph::Graph::add_edge`] whenever this node's incoming
    /// edge count changes. Only [`crate::control::MergeControlNode`] overrides
    /// this — it performs its own fan-in completion check rather than routing
    /// through the executor's join-collation table, so it needs to know its
    /// in-degree without the executor downcasting to a concrete type. Default is
    /// a no-op.
    fn set_incoming_degree(&mut self, _degree: usize) {}

    /// `Some(kind)` for atomic control-flow nodes, `None` otherwise. Used only
    /// by the graph validator's shape checks.
    fn control_kind(&self) -> Option<ControlKind> {
        None
    }

    /// Small JSON blob of validator-relevant construction parameters (e.g.
    /// `{"fork_count": 3}` for a Fork node). `None` when there is nothing
    /// beyond `control_kind` worth checking.
    fn control_param_hint(&self) -> Option<Value> {
        None
    }

    /// Convenience accessors delegating to [`NodeCore`], so callers rarely need
    /// `node.core().id()`.
    fn id(&self) -> &str {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn category(&self) -> NodeCategory {
        self.core().category()
    }

    fn status(&self) -> NodeStatus {
        self.core().status()
    }

    /// Drive `prep -> exec -> post` exactly once, in order, setting status
    /// transitions along the way. On any error from `prep` or `exec`, status
    /// becomes `Failed`, the error is recorded, and `post` is skipped.
    /// Returns the routing decision from `post` on success, though the
    /// executor's own dispatch loop derives its routing action from the
    /// shape of `exec`'s result instead of this return value (see
    /// [`crate::executor`]'s module docs).
    async fn run(&mut self) -> Result<Option<String>, ExecError> {
        self.core_mut().status = NodeStatus::Running;

        if let Err(e) = self.prep().await {
            self.core_mut().status = NodeStatus::Failed;
            self.core_mut().last_error = Some(e.to_string());
            return Err(e);
        }

        let result = match self.exec().await {
            Ok(v) => v,
            Err(e) => {
                self.core_mut().status = NodeStatus::Failed;
                self.core_mut().last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.core_mut().last_result = Some(result);

        let action = self.post().await;
        self.core_mut().status = NodeStatus::Success;
        Ok(action)
    }
}
