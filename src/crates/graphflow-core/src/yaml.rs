//! Declarative graph (de)serialization: [`GraphDef`] describes a graph's
//! static shape — node kind and parameters, edges, start/end markers — the
//! way a config loader would hand it in.
//!
//! Node behavior (task functions, branch predicates, retry targets, …) isn't
//! data and can't round-trip through YAML. Each [`NodeDef`] instead names its
//! handler(s) by string, the same way a `YamlNodeDef::handler`
//! does, and [`GraphDef::build`] resolves those names against a caller-
//! supplied [`NodeRegistry`] to produce a live [`Graph`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::control::{
    BranchControlNode, CombineFn, ForkControlNode, JoinControlNode, MergeControlNode,
    PredicateFn, SequenceControlNode, SequenceFn,
};
use crate::error::{GraphflowError, Result};
use crate::exception::{
    CircuitBreakerNode, ExceptionFilter, RetryNode, TargetFn, TimeoutNode, TryCatchNode,
};
use crate::graph::Graph;
use crate::node::Node;
use crate::task::{TaskFn, TaskNode};

fn default_action() -> String {
    crate::node::sentinel::DEFAULT.to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

/// A declarative node entry: display metadata plus its [`NodeDef`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub def: NodeDef,
}

/// The routing kind of a declared node and the construction parameters that
/// are data rather than code. `handler`/`combine`/`filter`/etc. fields name
/// callbacks resolved at [`GraphDef::build`] time through a [`NodeRegistry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDef {
    Task {
        handler: String,
    },
    Sequence {
        handler: String,
    },
    Branch {
        handler: String,
    },
    Merge {
        combine: String,
    },
    Fork {
        fork_count: usize,
    },
    Join {
        combine: String,
    },
    TryCatch {
        #[serde(rename = "try")]
        try_handler: String,
        catch: String,
        #[serde(default)]
        filter: Option<String>,
    },
    Retry {
        handler: String,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        #[serde(default = "default_retry_delay_ms")]
        retry_delay_ms: u64,
        #[serde(default = "default_backoff_factor")]
        backoff_factor: f64,
        #[serde(default)]
        filter: Option<String>,
    },
    Timeout {
        handler: String,
        timeout_ms: u64,
    },
    CircuitBreaker {
        handler: String,
        failure_threshold: u32,
        success_threshold: u32,
        timeout_ms: u64,
    },
}

/// A declared edge. `action` defaults to `"default"`, `weight` to `1.0`,
/// matching [`crate::graph::Graph::add_edge`]'s own defaults-by-convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// The top-level declarative graph shape. Serializable end to end, so a
/// `GraphDef` round-trips through YAML or JSON without needing a registry —
/// the registry is only needed to materialize an executable [`Graph`] from
/// it via [`GraphDef::build`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: IndexMap<String, NodeEntry>,
    pub edges: Vec<EdgeDef>,
    pub start: String,
    #[serde(default)]
    pub ends: Vec<String>,
}

impl GraphDef {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphflowError::Validation(format!("reading '{}': {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Shape-only checks: every edge endpoint, `start`, and `ends` entry
    /// names a node that's actually declared. This is deliberately shallow
    /// compared to [`crate::graph::Graph::validate`] — the richer structural
    /// invariants (branch arity, reachability, fork/join fan-out/fan-in
    /// counts) are re-checked for free once [`GraphDef::build`] hands back a
    /// live `Graph` and the caller calls `validate()` on it.
    pub fn validate(&self) -> Result<()> {
        if !self.nodes.contains_key(&self.start) {
            return Err(GraphflowError::Validation(format!(
                "start node '{}' is not declared",
                self.start
            )));
        }
        for end in &self.ends {
            if !self.nodes.contains_key(end) {
                return Err(GraphflowError::Validation(format!(
                    "end node '{end}' is not declared"
                )));
            }
        }
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from) {
                return Err(GraphflowError::Validation(format!(
                    "edge source '{}' is not declared",
                    edge.from
                )));
            }
            if !self.nodes.contains_key(&edge.to) {
                return Err(GraphflowError::Validation(format!(
                    "edge target '{}' is not declared",
                    edge.to
                )));
            }
        }
        Ok(())
    }

    /// Resolve every node's handler(s) against `registry` and assemble a live
    /// [`Graph`]. Callers should still run [`crate::graph::Graph::validate`]
    /// on the result before executing it.
    pub fn build(&self, registry: &NodeRegistry) -> Result<Graph> {
        self.validate()?;
        let mut graph = Graph::new(self.name.clone());

        for (id, entry) in &self.nodes {
            let name = entry.name.clone().unwrap_or_else(|| id.clone());
            let node: Box<dyn Node> = match &entry.def {
                NodeDef::Task { handler } => {
                    Box::new(TaskNode::new(id.clone(), name, registry.task(handler)?))
                }
                NodeDef::Sequence { handler } => Box::new(SequenceControlNode::new(
                    id.clone(),
                    name,
                    registry.sequence(handler)?,
                )),
                NodeDef::Branch { handler } => Box::new(BranchControlNode::new(
                    id.clone(),
                    name,
                    registry.predicate(handler)?,
                )),
                NodeDef::Merge { combine } => Box::new(MergeControlNode::new(
                    id.clone(),
                    name,
                    registry.combine(combine)?,
                )),
                NodeDef::Fork { fork_count } => {
                    Box::new(ForkControlNode::new(id.clone(), name, *fork_count))
                }
                NodeDef::Join { combine } => Box::new(JoinControlNode::new(
                    id.clone(),
                    name,
                    registry.combine(combine)?,
                )),
                NodeDef::TryCatch {
                    try_handler,
                    catch,
                    filter,
                } => {
                    let mut node = TryCatchNode::new(
                        id.clone(),
                        name,
                        registry.target(try_handler)?,
                        registry.catch(catch)?,
                    );
                    if let Some(f) = filter {
                        node = node.with_filter(registry.filter(f)?);
                    }
                    Box::new(node)
                }
                NodeDef::Retry {
                    handler,
                    max_retries,
                    retry_delay_ms,
                    backoff_factor,
                    filter,
                } => {
                    let mut node = RetryNode::new(id.clone(), name, registry.target(handler)?)
                        .with_max_retries(*max_retries)
                        .with_retry_delay(Duration::from_millis(*retry_delay_ms))
                        .with_backoff_factor(*backoff_factor);
                    if let Some(f) = filter {
                        node = node.with_filter(registry.filter(f)?);
                    }
                    Box::new(node)
                }
                NodeDef::Timeout { handler, timeout_ms } => Box::new(TimeoutNode::new(
                    id.clone(),
                    name,
                    registry.target(handler)?,
                    Duration::from_millis(*timeout_ms),
                )),
                NodeDef::CircuitBreaker {
                    handler,
                    failure_threshold,
                    success_threshold,
                    timeout_ms,
                } => Box::new(CircuitBreakerNode::new(
                    id.clone(),
                    name,
                    registry.target(handler)?,
                    *failure_threshold,
                    *success_threshold,
                    Duration::from_millis(*timeout_ms),
                )),
            };
            graph.add_node(node)?;
        }

        for edge in &self.edges {
            graph.add_edge(&edge.from, &edge.to, edge.action.clone(), edge.weight)?;
        }

        graph.set_start(&self.start)?;
        for end in &self.ends {
            graph.add_end(end)?;
        }

        Ok(graph)
    }
}

/// Named callbacks a [`GraphDef`] resolves against when building a live
/// [`Graph`] — the runtime counterpart to the Config loader's static shape.
/// Each `register_*` call is keyed by the handler name used in the
/// declarative source.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    tasks: HashMap<String, TaskFn>,
    sequences: HashMap<String, SequenceFn>,
    predicates: HashMap<String, PredicateFn>,
    combiners: HashMap<String, CombineFn>,
    catchers: HashMap<String, Arc<dyn Fn(Value, &str) -> Value + Send + Sync>>,
    targets: HashMap<String, TargetFn>,
    filters: HashMap<String, ExceptionFilter>,
}

macro_rules! registry_accessor {
    ($register:ident, $lookup:ident, $field:ident, $ty:ty, $what:literal) => {
        pub fn $register(&mut self, name: impl Into<String>, f: $ty) -> &mut Self {
            self.$field.insert(name.into(), f);
            self
        }

        fn $lookup(&self, name: &str) -> Result<$ty> {
            self.$field.get(name).cloned().ok_or_else(|| {
                GraphflowError::Validation(format!("no {} registered under name '{name}'", $what))
            })
        }
    };
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    registry_accessor!(register_task, task, tasks, TaskFn, "task handler");
    registry_accessor!(
        register_sequence,
        sequence,
        sequences,
        SequenceFn,
        "sequence handler"
    );
    registry_accessor!(
        register_predicate,
        predicate,
        predicates,
        PredicateFn,
        "branch predicate"
    );
    registry_accessor!(
        register_combine,
        combine,
        combiners,
        CombineFn,
        "combine function"
    );
    registry_accessor!(
        register_target,
        target,
        targets,
        TargetFn,
        "exception target"
    );
    registry_accessor!(
        register_filter,
        filter,
        filters,
        ExceptionFilter,
        "exception filter"
    );

    pub fn register_catch(
        &mut self,
        name: impl Into<String>,
        f: Arc<dyn Fn(Value, &str) -> Value + Send + Sync>,
    ) -> &mut Self {
        self.catchers.insert(name.into(), f);
        self
    }

    fn catch(&self, name: &str) -> Result<Arc<dyn Fn(Value, &str) -> Value + Send + Sync>> {
        self.catchers
            .get(name)
            .cloned()
            .ok_or_else(|| GraphflowError::Validation(format!("no catch handler registered under name '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_yaml() -> &'static str {
        r#"
name: double-then-stringify
start: double
ends: [stringify]
nodes:
  double:
    kind: task
    handler: double
  stringify:
    kind: task
    handler: stringify
edges:
  - from: double
    to: stringify
"#
    }

    #[test]
    fn parses_a_linear_graph_def() {
        let def = GraphDef::from_yaml_str(linear_yaml()).unwrap();
        assert_eq!(def.name, "double-then-stringify");
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.edges.len(), 1);
        assert_eq!(def.edges[0].action, "default");
        assert_eq!(def.edges[0].weight, 1.0);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn validate_rejects_an_undeclared_start_node() {
        let def = GraphDef {
            name: "g".into(),
            description: None,
            nodes: IndexMap::new(),
            edges: Vec::new(),
            start: "missing".into(),
            ends: Vec::new(),
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn graph_def_round_trips_through_yaml() {
        let def = GraphDef::from_yaml_str(linear_yaml()).unwrap();
        let yaml = def.to_yaml_string().unwrap();
        let reparsed = GraphDef::from_yaml_str(&yaml).unwrap();
        assert_eq!(def.name, reparsed.name);
        assert_eq!(def.nodes.len(), reparsed.nodes.len());
        assert_eq!(def.edges.len(), reparsed.edges.len());
    }

    #[test]
    fn graph_def_round_trips_through_json() {
        let def = GraphDef::from_yaml_str(linear_yaml()).unwrap();
        let value = def.to_json_value().unwrap();
        let reparsed = GraphDef::from_json_value(value).unwrap();
        assert_eq!(def.start, reparsed.start);
    }

    #[tokio::test]
    async fn build_resolves_handlers_and_executes() {
        let def = GraphDef::from_yaml_str(linear_yaml()).unwrap();
        let mut registry = NodeRegistry::new();
        registry.register_task(
            "double",
            Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) * 2))),
        );
        registry.register_task(
            "stringify",
            Arc::new(|v: Value| Ok(Value::String(v.to_string()))),
        );

        let mut graph = def.build(&registry).unwrap();
        assert!(graph.validate().ok());

        let ctx = crate::executor::GraphExecutor::new()
            .execute(&mut graph, Value::from(21))
            .await
            .unwrap();
        assert_eq!(ctx.graph_output(), Some(&Value::String("42".to_string())));
    }

    #[test]
    fn build_fails_on_an_unregistered_handler() {
        let def = GraphDef::from_yaml_str(linear_yaml()).unwrap();
        let registry = NodeRegistry::new();
        assert!(def.build(&registry).is_err());
    }

    #[test]
    fn fork_and_exception_node_defs_parse() {
        let yaml = r#"
name: fork-retry
start: fork
ends: [join]
nodes:
  fork:
    kind: fork
    fork_count: 2
  retry_a:
    kind: retry
    handler: flaky
    max_retries: 5
    retry_delay_ms: 10
  timeout_b:
    kind: timeout
    handler: slow
    timeout_ms: 200
  join:
    kind: join
    combine: wrap
edges:
  - from: fork
    to: retry_a
  - from: fork
    to: timeout_b
  - from: retry_a
    to: join
  - from: timeout_b
    to: join
"#;
        let def = GraphDef::from_yaml_str(yaml).unwrap();
        assert!(def.validate().is_ok());
        match &def.nodes["retry_a"].def {
            NodeDef::Retry { max_retries, .. } => assert_eq!(*max_retries, 5),
            other => panic!("unexpected node def: {other:?}"),
        }
    }
}
