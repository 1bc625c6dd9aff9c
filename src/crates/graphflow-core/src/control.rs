//! Atomic control-flow nodes: Sequence, Branch, Merge, Fork, Join.
//!
//! Grounded on `examples/original_source/src/graph/atomic_control_nodes.py`. The
//! Python `AtomicControlNode` base class is not reproduced as an inheritance
//! layer — each node embeds a [`NodeCore`] directly, per the "avoid deep
//! inheritance" design note.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::node::{sentinel, ControlKind, ExecError, Node, NodeCategory, NodeCore};

/// `input -> output`, used by [`SequenceControlNode`].
pub type SequenceFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// `input -> branch label`, used by [`BranchControlNode`].
pub type PredicateFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;
/// `collected inputs -> merged output`, used by [`MergeControlNode`] and
/// [`JoinControlNode`].
pub type CombineFn = Arc<dyn Fn(Vec<Value>) -> Value + Send + Sync>;

/// Passthrough control node: `exec` applies a process function, `post` is always
/// the default successor. Distinct from [`crate::task::TaskNode`] only in
/// [`NodeCategory`] — a control-flow author's "no-op that still counts as a
/// control node" building block.
pub struct SequenceControlNode {
    core: NodeCore,
    process_fn: SequenceFn,
}

impl SequenceControlNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, process_fn: SequenceFn) -> Self {
        SequenceControlNode {
            core: NodeCore::new(id, name, NodeCategory::Control),
            process_fn,
        }
    }

    pub fn passthrough(id: impl Into<String>, name: impl Into<String>) -> Self {
        SequenceControlNode::new(id, name, Arc::new(|v| v))
    }
}

#[async_trait]
impl Node for SequenceControlNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }
    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        Ok((self.process_fn)(input))
    }
    async fn post(&mut self) -> Option<String> {
        None
    }

    fn control_kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Sequence)
    }
}

/// Chooses an outgoing edge by evaluating a predicate over the input. `exec`
/// wraps the chosen branch and the original payload in an `{action, data}`
/// envelope; `post` reads `action` back out and returns it as the routing
/// decision, so the envelope only ever exists transiently inside this node.
pub struct BranchControlNode {
    core: NodeCore,
    predicate: PredicateFn,
}

impl BranchControlNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, predicate: PredicateFn) -> Self {
        BranchControlNode {
            core: NodeCore::new(id, name, NodeCategory::Control),
            predicate,
        }
    }

    /// A branch node whose predicate always picks `"default"`.
    pub fn always_default(id: impl Into<String>, name: impl Into<String>) -> Self {
        BranchControlNode::new(id, name, Arc::new(|_| sentinel::DEFAULT.to_string()))
    }
}

#[async_trait]
impl Node for BranchControlNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }
    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        let branch = (self.predicate)(&input);
        Ok(json!({"action": branch, "data": input}))
    }
    async fn post(&mut self) -> Option<String> {
        let action = self
            .core
            .last_result()
            .and_then(|r| r.get("action"))
            .and_then(|a| a.as_str())
            .unwrap_or(sentinel::DEFAULT)
            .to_string();
        Some(action)
    }

    fn control_kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Branch)
    }
}

/// Merges multiple predecessor arrivals into one output. The executor's
/// join-collation table only ever tracks [`JoinControlNode`] successors —
/// Merge performs its own fan-in accounting using the in-degree
/// the graph informs it of via [`Node::set_incoming_degree`], and is enqueued on
/// *every* arrival rather than being gated by the executor.
pub struct MergeControlNode {
    core: NodeCore,
    merge_fn: CombineFn,
    buffered: Vec<Value>,
    incoming_degree: usize,
}

impl MergeControlNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, merge_fn: CombineFn) -> Self {
        MergeControlNode {
            core: NodeCore::new(id, name, NodeCategory::Control),
            merge_fn,
            buffered: Vec::new(),
            incoming_degree: 1,
        }
    }

    /// Default merge function: the most recently arrived input, matching the
    /// Python original's `lambda x: x[-1] if x else None`.
    pub fn last_wins(id: impl Into<String>, name: impl Into<String>) -> Self {
        MergeControlNode::new(
            id,
            name,
            Arc::new(|inputs| inputs.into_iter().last().unwrap_or(Value::Null)),
        )
    }
}

#[async_trait]
impl Node for MergeControlNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();

        let explicit_batch = match &input {
            Value::Object(map) => map.get("__merge__").and_then(|v| v.as_array()).cloned(),
            _ => None,
        };
        if let Some(batch) = explicit_batch {
            return Ok((self.merge_fn)(batch));
        }
        if let Value::Array(batch) = &input {
            return Ok((self.merge_fn)(batch.clone()));
        }

        self.buffered.push(input);
        if self.buffered.len() >= self.incoming_degree {
            let collected = std::mem::take(&mut self.buffered);
            Ok((self.merge_fn)(collected))
        } else {
            Ok(json!({"__waiting__": true, "collected": self.buffered.len()}))
        }
    }

    async fn post(&mut self) -> Option<String> {
        if matches!(
            self.core.last_result().and_then(|r| r.get("__waiting__")),
            Some(Value::Bool(true))
        ) {
            Some(sentinel::WAITING.to_string())
        } else {
            None
        }
    }

    fn custom_state(&self) -> Value {
        json!({"buffered": self.buffered})
    }

    fn restore_custom_state(&mut self, state: Value) {
        if let Some(buffered) = state.get("buffered").and_then(|v| v.as_array()) {
            self.buffered = buffered.clone();
        }
    }

    fn reset(&mut self) {
        self.core.reset();
        self.buffered.clear();
    }

    fn set_incoming_degree(&mut self, degree: usize) {
        self.incoming_degree = degree.max(1);
    }

    fn control_kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Merge)
    }
}

/// Emits its input to every outgoing edge. The executor recognizes the
/// `__fork__` sentinel `post` returns and fans out; this node never decides how
/// many branches actually exist — that is graph topology, checked by
/// [`crate::graph::Graph::validate`] against the declared `fork_count`.
pub struct ForkControlNode {
    core: NodeCore,
    fork_count: usize,
}

impl ForkControlNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, fork_count: usize) -> Self {
        ForkControlNode {
            core: NodeCore::new(id, name, NodeCategory::Control),
            fork_count,
        }
    }

    pub fn fork_count(&self) -> usize {
        self.fork_count
    }
}

#[async_trait]
impl Node for ForkControlNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }
    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        Ok(json!({"__fork__": true, "count": self.fork_count, "data": input}))
    }
    async fn post(&mut self) -> Option<String> {
        Some(sentinel::FORK.to_string())
    }

    fn control_kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Fork)
    }

    fn control_param_hint(&self) -> Option<Value> {
        Some(json!({"fork_count": self.fork_count}))
    }
}

/// Waits for all predecessors to deliver before running. Unlike Merge, a Join's
/// fan-in accounting lives entirely in the executor's join-collation table (see
/// [`crate::executor::GraphExecutor`]): by the time `exec` runs, the executor has
/// already gathered one input per incoming edge into a JSON array, so `exec`
/// simply applies the combine function to it.
pub struct JoinControlNode {
    core: NodeCore,
    join_fn: CombineFn,
}

impl JoinControlNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, join_fn: CombineFn) -> Self {
        JoinControlNode {
            core: NodeCore::new(id, name, NodeCategory::Control),
            join_fn,
        }
    }

    /// Default join function: wrap the collected inputs as `{"joined": [...]}`,
    /// matching the Python original's `lambda x: {"joined": x}`.
    pub fn wrap(id: impl Into<String>, name: impl Into<String>) -> Self {
        JoinControlNode::new(id, name, Arc::new(|inputs| json!({"joined": inputs})))
    }
}

#[async_trait]
impl Node for JoinControlNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }
    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        let collected = match input {
            Value::Array(items) => items,
            other => vec![other],
        };
        Ok((self.join_fn)(collected))
    }
    async fn post(&mut self) -> Option<String> {
        None
    }

    fn control_kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeStatus;

    #[tokio::test]
    async fn branch_routes_by_predicate() {
        let mut node = BranchControlNode::new(
            "b",
            "b",
            Arc::new(|v| {
                if v.as_i64().unwrap_or(0) > 50 {
                    "high".into()
                } else {
                    "low".into()
                }
            }),
        );
        node.core_mut().set_input(Value::from(80));
        let action = node.run().await.unwrap();
        assert_eq!(action.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn merge_waits_until_incoming_degree_reached() {
        let mut node = MergeControlNode::last_wins("m", "m");
        node.set_incoming_degree(2);

        node.core_mut().set_input(Value::from(1));
        node.run().await.unwrap();
        assert_eq!(
            node.core().last_result().and_then(|r| r.get("__waiting__")),
            Some(&Value::Bool(true))
        );

        node.core_mut().set_input(Value::from(2));
        node.run().await.unwrap();
        assert_eq!(node.core().last_result(), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn fork_emits_fork_sentinel() {
        let mut node = ForkControlNode::new("f", "f", 3);
        node.core_mut().set_input(Value::from(10));
        let action = node.run().await.unwrap();
        assert_eq!(action.as_deref(), Some(sentinel::FORK));
        assert_eq!(node.status(), NodeStatus::Success);
    }

    #[tokio::test]
    async fn join_applies_combine_fn_to_pre_collated_list() {
        let mut node = JoinControlNode::new(
            "j",
            "j",
            Arc::new(|inputs| {
                Value::from(inputs.iter().filter_map(|v| v.as_i64()).sum::<i64>())
            }),
        );
        node.core_mut()
            .set_input(Value::Array(vec![Value::from(11), Value::from(12), Value::from(13)]));
        node.run().await.unwrap();
        assert_eq!(node.core().last_result(), Some(&Value::from(36)));
    }
}
