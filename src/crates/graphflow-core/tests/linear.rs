//! A linear chain: start -> double -> halve with input 10.

use graphflow_core::{Graph, GraphExecutor, TaskNode};
use serde_json::Value;
use std::sync::Arc;

fn linear_graph() -> Graph {
    let mut g = Graph::new("linear-scenario");
    g.add_node(Box::new(TaskNode::passthrough("start", "start")))
        .unwrap();
    g.add_node(Box::new(TaskNode::new(
        "double",
        "double",
        Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) * 2))),
    )))
    .unwrap();
    g.add_node(Box::new(TaskNode::new(
        "halve",
        "halve",
        Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) / 2))),
    )))
    .unwrap();
    g.add_edge("start", "double", "default", 1.0).unwrap();
    g.add_edge("double", "halve", "default", 1.0).unwrap();
    g.set_start("start").unwrap();
    g.add_end("halve").unwrap();
    g
}

#[tokio::test]
async fn linear_chain_yields_the_input_unchanged_through_double_then_halve() {
    let mut g = linear_graph();
    assert!(g.validate().ok());

    let ctx = GraphExecutor::new()
        .execute(&mut g, Value::from(10))
        .await
        .unwrap();

    assert_eq!(ctx.path(), &["start", "double", "halve"]);
    assert_eq!(ctx.visited().len(), 3);
    assert_eq!(ctx.graph_output(), Some(&Value::from(10)));
    assert!(ctx.is_completed());
}

#[tokio::test]
async fn each_node_receives_exactly_the_payload_its_predecessor_scheduled() {
    let mut g = linear_graph();
    let ctx = GraphExecutor::new()
        .execute(&mut g, Value::from(10))
        .await
        .unwrap();

    assert_eq!(ctx.node_output("start"), Some(&Value::from(10)));
    assert_eq!(ctx.node_output("double"), Some(&Value::from(20)));
    assert_eq!(ctx.node_output("halve"), Some(&Value::from(10)));
}
