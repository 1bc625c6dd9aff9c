use criterion::{black_box, criterion_group, criterion_main, Criterion};
use graphflow_core::{ForkControlNode, Graph, GraphExecutor, JoinControlNode, TaskNode};
use serde_json::Value;
use std::sync::Arc;

fn linear_chain(length: usize) -> Graph {
    let mut g = Graph::new("bench-linear");
    for i in 0..length {
        let id = format!("n{i}");
        g.add_node(Box::new(TaskNode::new(
            id.clone(),
            id,
            Arc::new(|v: Value| Ok(Value::from(v.as_i64().unwrap_or(0) + 1))),
        )))
        .unwrap();
    }
    for i in 0..length - 1 {
        g.add_edge(&format!("n{i}"), &format!("n{}", i + 1), "default", 1.0)
            .unwrap();
    }
    g.set_start("n0").unwrap();
    g.add_end(&format!("n{}", length - 1)).unwrap();
    g
}

fn fork_join_graph(width: usize) -> Graph {
    let mut g = Graph::new("bench-fork-join");
    g.add_node(Box::new(ForkControlNode::new("split", "split", width)))
        .unwrap();
    g.add_node(Box::new(JoinControlNode::wrap("join", "join")))
        .unwrap();
    for i in 0..width {
        let id = format!("branch{i}");
        g.add_node(Box::new(TaskNode::passthrough(id.clone(), id.clone())))
            .unwrap();
        g.add_edge("split", &id, "__fork__", 1.0).unwrap();
        g.add_edge(&id, "join", "default", 1.0).unwrap();
    }
    g.set_start("split").unwrap();
    g.add_end("join").unwrap();
    g
}

fn linear_execution_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("execute 50-node linear chain", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut g = linear_chain(50);
            let executor = GraphExecutor::new();
            executor.execute(&mut g, black_box(Value::from(0))).await.unwrap();
        });
    });
}

fn fork_join_execution_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("execute fan-out/fan-in of width 16", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut g = fork_join_graph(16);
            let executor = GraphExecutor::new();
            executor.execute(&mut g, black_box(Value::from(0))).await.unwrap();
        });
    });
}

fn validation_benchmark(c: &mut Criterion) {
    let g = linear_chain(200);
    c.bench_function("validate 200-node linear chain", |b| {
        b.iter(|| black_box(&g).validate());
    });
}

criterion_group!(
    benches,
    linear_execution_benchmark,
    fork_join_execution_benchmark,
    validation_benchmark
);
criterion_main!(benches);
