//! The queue-driven graph executor: [`GraphExecutor`], its hook registry, and
//! [`PauseHandle`].
//!
//! Grounded on `examples/original_source/src/graph/executor.py`'s
//! `GraphExecutor.execute`/`_execute_node`/`_extract_action`/`_handle_join_node`
//! for the dispatch loop and join-collation algorithm, and on
//! `enhanced_graph.py`'s `_create_checkpoint`/`_restore_from_snapshot` for
//! the checkpoint cadence and resume shape. A `pregel` superstep
//! loop is the nearest idiom for a queue-driven, hook-instrumented run loop in
//! this workspace's ancestry, but this engine drains one ready-queue rather
//! than stepping in lockstep supersteps.
//!
//! ## Dispatch
//!
//! A node's routing decision is re-derived from the shape of `exec`'s raw
//! result, the same way `_extract_action` does: an explicit top-level
//! `"action"` string wins, else `__fork__`/`__waiting__` envelope flags map to
//! their sentinels, else `"default"`. `post` itself is still always run as
//! part of [`crate::node::Node::run`], and its return is still what `run`
//! hands back to its caller — but the executor ignores that return for
//! routing purposes. `_call_node_with_input` in the original
//! discards `node.run()`'s return the same way, reading `node.result` instead.
//! This matters concretely for control nodes like
//! [`crate::control::MergeControlNode`], whose `post` cannot itself report
//! `__waiting__` cheaply from the outside; deriving the action from the
//! result's shape instead means the executor sees the waiting envelope
//! regardless of what any individual node's `post` chooses to return.
//!
//! The exec result's *shape* also matters for unwrapping the payload handed
//! to successors. A `{"action": ..., "data": d}` or
//! `{"__fork__": true, "data": d}` envelope hands `d` onward; anything else
//! is passed through unchanged.

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use graphflow_checkpoint::{
    CheckpointSaver, CheckpointType, ContextData, EdgeShape, ExecutionState, GraphShape,
    NodeShape, NodeState, Snapshot,
};
use indexmap::IndexMap;

use crate::context::ExecutionContext;
use crate::error::{GraphflowError, Result};
use crate::graph::Graph;
use crate::node::{sentinel, ControlKind, NodeStatus};

const DEFAULT_ITERATION_CEILING: usize = 100;
const DEFAULT_CHECKPOINT_INTERVAL: usize = 5;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// What happened to a node this tick, passed to registered hooks.
#[derive(Debug, Clone)]
pub enum HookEvent {
    BeforeNode { node_id: String, input: Value },
    AfterNode { node_id: String, result: Value, action: String },
    OnError { node_id: String, error: String },
    OnComplete { visited: usize, duration_ms: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HookKind {
    BeforeNode,
    AfterNode,
    OnError,
    OnComplete,
}

type Hook = Arc<dyn Fn(HookEvent) -> BoxFuture + Send + Sync>;

/// The four-event hook registry. Hooks observe the run; they
/// never influence dispatch.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: Vec<(HookKind, Hook)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry { hooks: Vec::new() }
    }

    fn register<F, Fut>(&mut self, kind: HookKind, hook: F)
    where
        F: Fn(HookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.push((kind, Arc::new(move |ev| Box::pin(hook(ev)) as BoxFuture)));
    }

    pub fn on_before_node<F, Fut>(&mut self, hook: F)
    where
        F: Fn(HookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(HookKind::BeforeNode, hook);
    }

    pub fn on_after_node<F, Fut>(&mut self, hook: F)
    where
        F: Fn(HookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(HookKind::AfterNode, hook);
    }

    pub fn on_error<F, Fut>(&mut self, hook: F)
    where
        F: Fn(HookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(HookKind::OnError, hook);
    }

    pub fn on_complete<F, Fut>(&mut self, hook: F)
    where
        F: Fn(HookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(HookKind::OnComplete, hook);
    }

    async fn fire(&self, kind: HookKind, event: HookEvent) {
        for (k, hook) in &self.hooks {
            if *k == kind {
                hook(event.clone()).await;
            }
        }
    }
}

/// A cloneable pause switch, handed out by [`GraphExecutor::pause_handle`] so
/// a caller can pause a run from outside the task driving [`GraphExecutor::execute`].
#[derive(Clone)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Partial inputs collected for one join node, keyed by the predecessor that
/// delivered each, in arrival order.
#[derive(Default)]
struct JoinCollation {
    inputs: IndexMap<String, Value>,
}

/// Drives a [`Graph`] from its start node to drain, dispatching on each
/// node's routing decision, collating fan-in at Join nodes, and optionally
/// checkpointing through a [`CheckpointSaver`].
pub struct GraphExecutor {
    iteration_ceiling: usize,
    checkpoint_interval: usize,
    checkpoint_saver: Option<Arc<dyn CheckpointSaver>>,
    hooks: HookRegistry,
    paused: Arc<AtomicBool>,
    checkpoint_seq: AtomicU64,
}

impl Default for GraphExecutor {
    fn default() -> Self {
        GraphExecutor {
            iteration_ceiling: DEFAULT_ITERATION_CEILING,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            checkpoint_saver: None,
            hooks: HookRegistry::new(),
            paused: Arc::new(AtomicBool::new(false)),
            checkpoint_seq: AtomicU64::new(0),
        }
    }
}

impl GraphExecutor {
    pub fn new() -> Self {
        GraphExecutor::default()
    }

    pub fn with_iteration_ceiling(mut self, ceiling: usize) -> Self {
        self.iteration_ceiling = ceiling;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn with_checkpoint_saver(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpoint_saver = Some(saver);
        self
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle(self.paused.clone())
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume_run(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Run `graph` from its declared start node with `input`, to drain or to
    /// the iteration ceiling, whichever comes first. Validation errors are
    /// logged but never block a run (`validate` is advisory).
    pub async fn execute(&self, graph: &mut Graph, input: Value) -> Result<ExecutionContext> {
        self.run_from(graph, input, None).await
    }

    /// Like [`GraphExecutor::execute`], but saves an `initial` checkpoint
    /// before the run, an `auto` checkpoint every `checkpoint_interval`
    /// visited nodes, and a `final`/`error` checkpoint at the end.
    pub async fn execute_with_checkpoints(
        &self,
        graph: &mut Graph,
        input: Value,
    ) -> Result<ExecutionContext> {
        if self.checkpoint_saver.is_none() {
            return Err(GraphflowError::Validation(
                "execute_with_checkpoints called without a configured CheckpointSaver".into(),
            ));
        }
        self.run_from(graph, input, None).await
    }

    /// Resume a run from a previously captured snapshot. The live `graph`
    /// must be topologically equivalent to the one the snapshot was taken
    /// against; a node present in the snapshot but absent from
    /// `graph` is skipped silently rather than raising.
    pub async fn resume(&self, graph: &mut Graph, snapshot: Snapshot) -> Result<ExecutionContext> {
        let ctx = ExecutionContext::from_snapshot(&snapshot.execution_state);

        let mut seed = VecDeque::new();
        let mut joins: HashMap<String, JoinCollation> = HashMap::new();
        for (id, state) in &snapshot.node_states {
            let Some(node) = graph.get_node_mut(id) else {
                continue;
            };
            let status: NodeStatus = serde_json::from_value(Value::String(state.status.clone()))
                .unwrap_or(NodeStatus::Pending);
            node.core_mut()
                .restore(status, state.result.clone(), state.input_data.clone());
            node.restore_custom_state(state.custom_state.clone());
        }

        if let Some(current) = snapshot.execution_state.current_node.clone() {
            let current_status = graph.get_node(&current).map(|n| n.status());
            match current_status {
                Some(NodeStatus::Success) => {
                    if let Some(node) = graph.get_node(&current) {
                        let result = node.core().last_result().cloned().unwrap_or(Value::Null);
                        let action = infer_action_from_shape(&result);
                        self.dispatch(graph, &current, &action, &result, &mut joins, &mut seed);
                    }
                }
                Some(_) | None => {
                    let payload = graph
                        .get_node(&current)
                        .and_then(|n| n.core().input().cloned())
                        .unwrap_or_else(|| snapshot.execution_state.graph_input.clone());
                    seed.push_back((current, payload));
                }
            }
        }

        self.drain(graph, ctx, seed, joins, Some(snapshot.graph_id)).await
    }

    async fn run_from(
        &self,
        graph: &mut Graph,
        input: Value,
        resume_from: Option<Value>,
    ) -> Result<ExecutionContext> {
        let report = graph.validate();
        if !report.ok() {
            for err in report.errors() {
                tracing::warn!(error = %err, "graph validation error (proceeding anyway)");
            }
        }
        for warning in report.warnings() {
            tracing::debug!(warning = %warning, "graph validation warning");
        }

        let now = Utc::now();
        let mut ctx = ExecutionContext::new(now, input.clone());

        let start = graph
            .start()
            .ok_or_else(|| GraphflowError::Validation("graph has no start node".into()))?
            .to_string();

        if self.checkpoint_saver.is_some() {
            self.save_checkpoint(graph, &ctx, CheckpointType::Initial).await?;
        }

        let seed = VecDeque::from([(start, resume_from.unwrap_or(input))]);
        self.drain(graph, ctx, seed, HashMap::new(), None).await
    }

    async fn drain(
        &self,
        graph: &mut Graph,
        mut ctx: ExecutionContext,
        mut queue: VecDeque<(String, Value)>,
        mut joins: HashMap<String, JoinCollation>,
        graph_id_override: Option<String>,
    ) -> Result<ExecutionContext> {
        let mut iterations = 0usize;

        while let Some((node_id, node_input)) = queue.pop_front() {
            if self.paused.load(Ordering::SeqCst) {
                tracing::info!(node_id = %node_id, "run paused before dequeue");
                queue.push_front((node_id, node_input));
                break;
            }

            if iterations >= self.iteration_ceiling {
                let msg = format!("iteration ceiling of {} exceeded", self.iteration_ceiling);
                tracing::warn!("{msg}");
                ctx.add_diagnostic(msg);
                break;
            }
            iterations += 1;

            if !graph.contains_node(&node_id) {
                continue;
            }

            self.hooks
                .fire(
                    HookKind::BeforeNode,
                    HookEvent::BeforeNode {
                        node_id: node_id.clone(),
                        input: node_input.clone(),
                    },
                )
                .await;

            let node = graph.get_node_mut(&node_id).unwrap();
            node.core_mut().set_input(node_input.clone());
            let run_result = node.run().await;
            let result = node.core().last_result().cloned().unwrap_or(Value::Null);

            match run_result {
                Ok(_action_opt) => {
                    let action = infer_action_from_shape(&result);
                    let now = Utc::now();
                    ctx.add_execution(
                        now,
                        node_id.clone(),
                        node_input,
                        result.clone(),
                        Some(action.clone()),
                        None,
                    );

                    self.hooks
                        .fire(
                            HookKind::AfterNode,
                            HookEvent::AfterNode {
                                node_id: node_id.clone(),
                                result: result.clone(),
                                action: action.clone(),
                            },
                        )
                        .await;

                    self.dispatch(graph, &node_id, &action, &result, &mut joins, &mut queue);
                }
                Err(e) => {
                    let message = e.to_string();
                    let now = Utc::now();
                    ctx.add_execution(
                        now,
                        node_id.clone(),
                        node_input,
                        Value::Null,
                        None,
                        Some(message.clone()),
                    );

                    self.hooks
                        .fire(
                            HookKind::OnError,
                            HookEvent::OnError {
                                node_id: node_id.clone(),
                                error: message.clone(),
                            },
                        )
                        .await;

                    if let Some(edge) = graph.edge_for_action(&node_id, sentinel::ERROR) {
                        let to = edge.to.clone();
                        queue.push_back((
                            to,
                            serde_json::json!({ "error": message, "from_node": node_id }),
                        ));
                    } else {
                        ctx.finish(Utc::now());
                        if self.checkpoint_saver.is_some() {
                            self.save_checkpoint(graph, &ctx, CheckpointType::Error).await?;
                        }
                        return Err(GraphflowError::node_execution(node_id, message));
                    }
                }
            }

            if self.checkpoint_saver.is_some()
                && ctx.visited().len() % self.checkpoint_interval == 0
            {
                self.save_checkpoint(graph, &ctx, CheckpointType::Auto).await?;
            }
        }

        for (join_id, collation) in &joins {
            if !collation.inputs.is_empty() {
                let expected = graph.incoming(join_id).len();
                ctx.add_diagnostic(format!(
                    "join '{join_id}' starved: received {} of {expected} expected inputs",
                    collation.inputs.len()
                ));
            }
        }

        ctx.finish(Utc::now());
        self.hooks
            .fire(
                HookKind::OnComplete,
                HookEvent::OnComplete {
                    visited: ctx.visited().len(),
                    duration_ms: ctx.duration(Utc::now()).num_milliseconds(),
                },
            )
            .await;

        if self.checkpoint_saver.is_some() {
            self.save_checkpoint_as(graph, &ctx, CheckpointType::Final, graph_id_override)
                .await?;
        }

        Ok(ctx)
    }

    /// Apply the dispatch rules for one node's `(action, result)`: `__fork__`
    /// enqueues every outgoing edge with the unwrapped payload, `__waiting__`
    /// and `__exit__` enqueue nothing, otherwise the single edge labeled
    /// `action` is taken — and a missing edge simply ends this branch, never
    /// an error. Any target whose node is a Join is routed
    /// through `joins`'s collation table instead of the ready-queue directly.
    fn dispatch(
        &self,
        graph: &Graph,
        node_id: &str,
        action: &str,
        result: &Value,
        joins: &mut HashMap<String, JoinCollation>,
        queue: &mut VecDeque<(String, Value)>,
    ) {
        let payload = unwrap_payload(action, result);

        let targets: Vec<String> = if action == sentinel::FORK {
            graph.outgoing(node_id).into_iter().map(|e| e.to.clone()).collect()
        } else if action == sentinel::WAITING || action == sentinel::EXIT {
            Vec::new()
        } else {
            match graph.edge_for_action(node_id, action) {
                Some(edge) => vec![edge.to.clone()],
                None => {
                    tracing::debug!(node_id, action, "no outgoing edge for action; branch ends here");
                    Vec::new()
                }
            }
        };

        for target in targets {
            let is_join = graph
                .get_node(&target)
                .map(|n| n.control_kind() == Some(ControlKind::Join))
                .unwrap_or(false);
            if !is_join {
                queue.push_back((target, payload.clone()));
                continue;
            }
            let expected = graph.incoming(&target).len();
            let collation = joins.entry(target.clone()).or_default();
            collation.inputs.insert(node_id.to_string(), payload.clone());
            if collation.inputs.len() >= expected {
                let values: Vec<Value> = collation.inputs.values().cloned().collect();
                joins.remove(&target);
                queue.push_back((target, Value::Array(values)));
            }
        }
    }

    async fn save_checkpoint(
        &self,
        graph: &Graph,
        ctx: &ExecutionContext,
        checkpoint_type: CheckpointType,
    ) -> Result<()> {
        self.save_checkpoint_as(graph, ctx, checkpoint_type, None).await
    }

    async fn save_checkpoint_as(
        &self,
        graph: &Graph,
        ctx: &ExecutionContext,
        checkpoint_type: CheckpointType,
        graph_id_override: Option<String>,
    ) -> Result<()> {
        let Some(saver) = &self.checkpoint_saver else {
            return Ok(());
        };
        let seq = self.checkpoint_seq.fetch_add(1, Ordering::SeqCst);
        let snapshot = capture_snapshot(graph, ctx, checkpoint_type, seq, graph_id_override);
        saver.save(snapshot).await?;
        Ok(())
    }
}

/// Unwrap `{"action": ..., "data": d}` / `{"__fork__": true, "data": d}`
/// envelopes to the payload handed to successors; anything else passes
/// through unchanged.
fn unwrap_payload(action: &str, result: &Value) -> Value {
    if let Value::Object(map) = result {
        if action == sentinel::FORK {
            return map.get("data").cloned().unwrap_or(Value::Null);
        }
        if map.contains_key("action") && map.contains_key("data") {
            return map["data"].clone();
        }
    }
    result.clone()
}

/// The dispatch-rule algorithm itself: derives a routing action purely from
/// the shape of a node's raw `exec` result, the way `_extract_action` does,
/// regardless of what that node's `post` returned. Used by
/// [`GraphExecutor::drain`] for every live dispatch, and by
/// [`GraphExecutor::resume`] for a `current_node` that already reached
/// `Success` before the snapshot was taken (whose chosen action isn't part of
/// the wire format and so must be re-derived the same way).
fn infer_action_from_shape(result: &Value) -> String {
    if let Value::Object(map) = result {
        if let Some(Value::String(a)) = map.get("action") {
            return a.clone();
        }
        if matches!(map.get("__fork__"), Some(Value::Bool(true))) {
            return sentinel::FORK.to_string();
        }
        if matches!(map.get("__waiting__"), Some(Value::Bool(true))) {
            return sentinel::WAITING.to_string();
        }
    }
    sentinel::DEFAULT.to_string()
}

fn capture_snapshot(
    graph: &Graph,
    ctx: &ExecutionContext,
    checkpoint_type: CheckpointType,
    checkpoint_number: u64,
    graph_id_override: Option<String>,
) -> Snapshot {
    let mut nodes = HashMap::new();
    for id in graph.node_ids() {
        let node = graph.get_node(id).unwrap();
        let category = serde_json::to_value(node.category())
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let status = serde_json::to_value(node.status())
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        nodes.insert(
            id.to_string(),
            NodeShape {
                node_type: category,
                name: node.name().to_string(),
                status,
            },
        );
    }

    let mut edges = Vec::new();
    for id in graph.node_ids() {
        for edge in graph.outgoing(id) {
            edges.push(EdgeShape {
                from: edge.from.clone(),
                to: edge.to.clone(),
                condition: edge.action.clone(),
            });
        }
    }

    let graph_structure = GraphShape {
        name: graph.name().to_string(),
        nodes,
        edges,
        start_node: graph.start().unwrap_or_default().to_string(),
        end_nodes: graph.ends().map(str::to_string).collect(),
    };

    let execution_state = ExecutionState {
        current_node: ctx.current_node().map(str::to_string),
        visited_nodes: ctx.visited().to_vec(),
        node_outputs: ctx.node_outputs().clone(),
        graph_input: ctx.graph_input().clone(),
        start_time: ctx.start_time(),
        status: if ctx.is_completed() { "completed".to_string() } else { "running".to_string() },
    };

    let mut node_states = HashMap::new();
    for id in graph.node_ids() {
        let node = graph.get_node(id).unwrap();
        let status = serde_json::to_value(node.status())
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        node_states.insert(
            id.to_string(),
            NodeState {
                status,
                result: node.core().last_result().cloned(),
                input_data: node.core().input().cloned(),
                custom_state: node.custom_state(),
            },
        );
    }

    Snapshot {
        graph_id: graph_id_override.unwrap_or_else(|| graph.name().to_string()),
        timestamp: Utc::now(),
        graph_structure,
        execution_state,
        node_states,
        context_data: ContextData {
            checkpoint_type,
            checkpoint_number,
            extra: HashMap::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{BranchControlNode, ForkControlNode, JoinControlNode};
    use crate::task::TaskNode;
    use graphflow_checkpoint::InMemoryCheckpointSaver;
    use std::sync::atomic::AtomicUsize;

    fn linear_graph() -> Graph {
        let mut g = Graph::new("linear");
        g.add_node(Box::new(TaskNode::new(
            "double",
            "double",
            Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) * 2))),
        )))
        .unwrap();
        g.add_node(Box::new(TaskNode::new(
            "increment",
            "increment",
            Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) + 1))),
        )))
        .unwrap();
        g.add_edge("double", "increment", "default", 1.0).unwrap();
        g.set_start("double").unwrap();
        g.add_end("increment").unwrap();
        g
    }

    #[tokio::test]
    async fn linear_run_executes_every_node_in_order_and_yields_final_output() {
        let mut g = linear_graph();
        let executor = GraphExecutor::new();
        let ctx = executor.execute(&mut g, Value::from(5)).await.unwrap();
        assert_eq!(ctx.path(), &["double", "increment"]);
        assert_eq!(ctx.graph_output(), Some(&Value::from(11)));
        assert!(ctx.is_completed());
    }

    #[tokio::test]
    async fn branch_run_takes_only_the_matching_edge() {
        let mut g = Graph::new("branch");
        g.add_node(Box::new(BranchControlNode::new(
            "check",
            "check",
            Arc::new(|v: &Value| {
                if v.as_i64().unwrap_or(0) > 0 {
                    "positive".to_string()
                } else {
                    "negative".to_string()
                }
            }),
        )))
        .unwrap();
        g.add_node(Box::new(TaskNode::passthrough("pos", "pos"))).unwrap();
        g.add_node(Box::new(TaskNode::passthrough("neg", "neg"))).unwrap();
        g.add_edge("check", "pos", "positive", 1.0).unwrap();
        g.add_edge("check", "neg", "negative", 1.0).unwrap();
        g.set_start("check").unwrap();
        g.add_end("pos").unwrap();
        g.add_end("neg").unwrap();

        let executor = GraphExecutor::new();
        let ctx = executor.execute(&mut g, Value::from(5)).await.unwrap();
        assert_eq!(ctx.path(), &["check", "pos"]);
    }

    #[tokio::test]
    async fn fork_join_waits_for_every_branch_before_collating() {
        let mut g = Graph::new("fork_join");
        g.add_node(Box::new(ForkControlNode::new("split", "split", 2))).unwrap();
        g.add_node(Box::new(TaskNode::passthrough("left", "left"))).unwrap();
        g.add_node(Box::new(TaskNode::passthrough("right", "right"))).unwrap();
        g.add_node(Box::new(JoinControlNode::new(
            "merge",
            "merge",
            Arc::new(|vs: Vec<Value>| Value::from(vs.len())),
        )))
        .unwrap();
        g.add_edge("split", "left", "__fork__", 1.0).unwrap();
        g.add_edge("split", "right", "__fork__", 1.0).unwrap();
        g.add_edge("left", "merge", "default", 1.0).unwrap();
        g.add_edge("right", "merge", "default", 1.0).unwrap();
        g.set_start("split").unwrap();
        g.add_end("merge").unwrap();

        let executor = GraphExecutor::new();
        let ctx = executor.execute(&mut g, Value::from(1)).await.unwrap();
        assert!(ctx.has_visited("left"));
        assert!(ctx.has_visited("right"));
        assert!(ctx.has_visited("merge"));
        assert_eq!(ctx.node_output("merge"), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn iteration_ceiling_stops_an_infinite_loop_and_records_a_diagnostic() {
        let mut g = Graph::new("loop");
        g.add_node(Box::new(TaskNode::passthrough("a", "a"))).unwrap();
        g.add_edge("a", "a", "default", 1.0).unwrap();
        g.set_start("a").unwrap();

        let executor = GraphExecutor::new().with_iteration_ceiling(5);
        let ctx = executor.execute(&mut g, Value::Null).await.unwrap();
        assert_eq!(ctx.path().len(), 5);
        assert!(!ctx.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn missing_error_edge_on_a_failing_node_propagates_fatally() {
        let mut g = Graph::new("fail");
        g.add_node(Box::new(TaskNode::new(
            "boom",
            "boom",
            Arc::new(|_| Err("kaboom".into())),
        )))
        .unwrap();
        g.set_start("boom").unwrap();
        g.add_end("boom").unwrap();

        let executor = GraphExecutor::new();
        let err = executor.execute(&mut g, Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("kaboom"));
    }

    #[tokio::test]
    async fn error_edge_on_a_failing_node_routes_to_the_handler_instead_of_propagating() {
        let mut g = Graph::new("fail_handled");
        g.add_node(Box::new(TaskNode::new(
            "boom",
            "boom",
            Arc::new(|_| Err("kaboom".into())),
        )))
        .unwrap();
        g.add_node(Box::new(TaskNode::passthrough("handler", "handler"))).unwrap();
        g.add_edge("boom", "handler", "error", 1.0).unwrap();
        g.set_start("boom").unwrap();
        g.add_end("handler").unwrap();

        let executor = GraphExecutor::new();
        let ctx = executor.execute(&mut g, Value::Null).await.unwrap();
        assert_eq!(ctx.path(), &["boom", "handler"]);
    }

    #[tokio::test]
    async fn checkpointed_run_saves_an_initial_and_a_final_snapshot() {
        let mut g = linear_graph();
        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let executor = GraphExecutor::new().with_checkpoint_saver(saver.clone());
        executor.execute_with_checkpoints(&mut g, Value::from(1)).await.unwrap();
        let all = saver.list("linear").await.unwrap();
        assert!(all.len() >= 2, "expected at least initial + final snapshots, got {}", all.len());
        assert_eq!(all.first().unwrap().checkpoint_type(), CheckpointType::Initial);
        assert_eq!(all.last().unwrap().checkpoint_type(), CheckpointType::Final);
    }

    #[tokio::test]
    async fn hooks_fire_before_and_after_each_node_and_on_complete() {
        let mut g = linear_graph();
        let before_count = Arc::new(AtomicUsize::new(0));
        let after_count = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut executor = GraphExecutor::new();
        let b = before_count.clone();
        executor.hooks_mut().on_before_node(move |_ev| {
            let b = b.clone();
            async move {
                b.fetch_add(1, Ordering::SeqCst);
            }
        });
        let a = after_count.clone();
        executor.hooks_mut().on_after_node(move |_ev| {
            let a = a.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
            }
        });
        let c = completed.clone();
        executor.hooks_mut().on_complete(move |_ev| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        executor.execute(&mut g, Value::from(1)).await.unwrap();
        assert_eq!(before_count.load(Ordering::SeqCst), 2);
        assert_eq!(after_count.load(Ordering::SeqCst), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}
