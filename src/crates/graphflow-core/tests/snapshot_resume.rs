//! The resume idempotence property: resuming from a snapshot continues a run
//! to the same visited-set and node-outputs as an unsnapshotted continuation,
//! and resuming from a `final` snapshot is a no-op that reproduces the
//! finished state.

use graphflow_core::checkpoint::{CheckpointSaver, CheckpointType, InMemoryCheckpointSaver};
use graphflow_core::{Graph, GraphExecutor, TaskNode};
use serde_json::Value;
use std::sync::Arc;

fn three_step_graph() -> Graph {
    let mut g = Graph::new("resumable");
    g.add_node(Box::new(TaskNode::new(
        "a",
        "a",
        Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) + 1))),
    )))
    .unwrap();
    g.add_node(Box::new(TaskNode::new(
        "b",
        "b",
        Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) * 10))),
    )))
    .unwrap();
    g.add_node(Box::new(TaskNode::new(
        "c",
        "c",
        Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) - 3))),
    )))
    .unwrap();
    g.add_edge("a", "b", "default", 1.0).unwrap();
    g.add_edge("b", "c", "default", 1.0).unwrap();
    g.set_start("a").unwrap();
    g.add_end("c").unwrap();
    g
}

#[tokio::test]
async fn resuming_from_an_auto_checkpoint_reaches_the_same_outcome_as_an_unbroken_run() {
    let mut baseline = three_step_graph();
    let baseline_ctx = GraphExecutor::new()
        .execute(&mut baseline, Value::from(1))
        .await
        .unwrap();

    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut g = three_step_graph();
    let executor = GraphExecutor::new()
        .with_checkpoint_interval(1)
        .with_checkpoint_saver(saver.clone());
    executor
        .execute_with_checkpoints(&mut g, Value::from(1))
        .await
        .unwrap();

    let snapshots = saver.list("resumable").await.unwrap();
    let mid = snapshots
        .iter()
        .find(|s| s.execution_state.visited_nodes == vec!["a".to_string()])
        .expect("expected a checkpoint taken right after node 'a'")
        .clone();

    let mut resumed_graph = three_step_graph();
    let resume_executor = GraphExecutor::new();
    let resumed_ctx = resume_executor
        .resume(&mut resumed_graph, mid)
        .await
        .unwrap();

    assert_eq!(resumed_ctx.graph_output(), baseline_ctx.graph_output());
    let mut resumed_visited = resumed_ctx.visited().to_vec();
    resumed_visited.sort();
    let mut baseline_visited = baseline_ctx.visited().to_vec();
    baseline_visited.sort();
    assert_eq!(resumed_visited, baseline_visited);
}

#[tokio::test]
async fn resuming_from_a_final_snapshot_is_idempotent() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut g = three_step_graph();
    let executor = GraphExecutor::new().with_checkpoint_saver(saver.clone());
    executor
        .execute_with_checkpoints(&mut g, Value::from(1))
        .await
        .unwrap();

    let final_snapshot = saver
        .list("resumable")
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.checkpoint_type() == CheckpointType::Final)
        .unwrap();

    let mut resumed_graph = three_step_graph();
    let resumed_ctx = GraphExecutor::new()
        .resume(&mut resumed_graph, final_snapshot.clone())
        .await
        .unwrap();

    let mut visited = resumed_ctx.visited().to_vec();
    visited.sort();
    let mut expected = final_snapshot.execution_state.visited_nodes.clone();
    expected.sort();
    assert_eq!(visited, expected);
    assert_eq!(
        resumed_ctx.node_outputs(),
        &final_snapshot.execution_state.node_outputs
    );
}

#[tokio::test]
async fn a_node_present_in_the_snapshot_but_absent_from_the_live_graph_is_skipped_not_raised() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let mut g = three_step_graph();
    let executor = GraphExecutor::new()
        .with_checkpoint_interval(1)
        .with_checkpoint_saver(saver.clone());
    executor
        .execute_with_checkpoints(&mut g, Value::from(1))
        .await
        .unwrap();

    let snapshots = saver.list("resumable").await.unwrap();
    let mid = snapshots
        .iter()
        .find(|s| s.execution_state.visited_nodes == vec!["a".to_string()])
        .unwrap()
        .clone();

    // Build a graph missing node "c" entirely; resume must not panic or error.
    let mut trimmed = Graph::new("resumable");
    trimmed
        .add_node(Box::new(TaskNode::new(
            "a",
            "a",
            Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) + 1))),
        )))
        .unwrap();
    trimmed
        .add_node(Box::new(TaskNode::new(
            "b",
            "b",
            Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) * 10))),
        )))
        .unwrap();
    trimmed.add_edge("a", "b", "default", 1.0).unwrap();
    trimmed.set_start("a").unwrap();
    trimmed.add_end("b").unwrap();

    let resumed_ctx = GraphExecutor::new()
        .resume(&mut trimmed, mid)
        .await
        .unwrap();
    assert!(resumed_ctx.has_visited("b"));
}
