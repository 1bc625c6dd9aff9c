//! [`TaskNode`] — wraps a pure function `input -> output`.
//!
//! Grounded on `examples/original_source/src/graph/node_types.py`'s `TaskNode`:
//! `exec` calls the configured function if one was supplied, otherwise falls back
//! to an override hook; `post` always takes the default outgoing edge.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::node::{ExecError, Node, NodeCategory, NodeCore};

/// A synchronous `input -> output` function. `Arc` so it can be cloned cheaply
/// when the same task is reused across graph copies.
pub type TaskFn = Arc<dyn Fn(Value) -> Result<Value, ExecError> + Send + Sync>;

/// A plain task node: `exec` applies [`TaskNode::process_fn`] to the scratch
/// input; `post` is always the default successor.
pub struct TaskNode {
    core: NodeCore,
    process_fn: TaskFn,
}

impl TaskNode {
    /// Build a task node around a process function. Without one, `exec` returns
    /// the input unchanged — mirroring the Python original's identity fallback
    /// when no `process_func` is supplied and no subclass override exists.
    pub fn new(id: impl Into<String>, name: impl Into<String>, process_fn: TaskFn) -> Self {
        TaskNode {
            core: NodeCore::new(id, name, NodeCategory::Task),
            process_fn,
        }
    }

    /// Build a task node with the identity function.
    pub fn passthrough(id: impl Into<String>, name: impl Into<String>) -> Self {
        TaskNode::new(id, name, Arc::new(Ok))
    }
}

#[async_trait]
impl Node for TaskNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        (self.process_fn)(input)
    }

    async fn post(&mut self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn double_doubles_input() {
        let mut node = TaskNode::new(
            "double",
            "double",
            Arc::new(|v| Ok(Value::from(v.as_i64().unwrap_or(0) * 2))),
        );
        node.core_mut().set_input(Value::from(10));
        let action = node.run().await.unwrap();
        assert_eq!(action, None);
        assert_eq!(node.core().last_result(), Some(&Value::from(20)));
        assert_eq!(node.status(), crate::node::NodeStatus::Success);
    }

    #[tokio::test]
    async fn passthrough_returns_input_unchanged() {
        let mut node = TaskNode::passthrough("id", "name");
        node.core_mut().set_input(Value::from("hello"));
        node.run().await.unwrap();
        assert_eq!(node.core().last_result(), Some(&Value::from("hello")));
    }

    #[tokio::test]
    async fn failing_process_fn_marks_node_failed() {
        let mut node: TaskNode = TaskNode::new(
            "boom",
            "boom",
            Arc::new(|_| Err("kaboom".into())),
        );
        node.core_mut().set_input(Value::Null);
        let err = node.run().await.unwrap_err();
        assert_eq!(err.to_string(), "kaboom");
        assert_eq!(node.status(), crate::node::NodeStatus::Failed);
        assert_eq!(node.core().last_error(), Some("kaboom"));
    }
}
