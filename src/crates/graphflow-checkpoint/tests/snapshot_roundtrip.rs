//! The snapshot round-trip bijection property: encoding and decoding a
//! snapshot through JSON never loses or mutates data, across randomly
//! generated node counts, visited paths, and outputs.

use chrono::{TimeZone, Utc};
use graphflow_checkpoint::{
    CheckpointType, ContextData, EdgeShape, ExecutionState, GraphShape, NodeShape, NodeState,
    Snapshot,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;

fn node_id_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn build_snapshot(ids: Vec<String>, checkpoint_number: u64, epoch_secs: i64) -> Snapshot {
    let timestamp = Utc.timestamp_opt(epoch_secs, 0).single().unwrap_or_else(Utc::now);

    let mut nodes = HashMap::new();
    let mut node_outputs = HashMap::new();
    let mut node_states = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        nodes.insert(
            id.clone(),
            NodeShape {
                node_type: "task".into(),
                name: id.clone(),
                status: "SUCCESS".into(),
            },
        );
        node_outputs.insert(id.clone(), json!(i as i64));
        node_states.insert(
            id.clone(),
            NodeState {
                status: "SUCCESS".into(),
                result: Some(json!(i as i64)),
                input_data: Some(json!(i as i64 - 1)),
                custom_state: Value::Null,
            },
        );
    }
    let edges = ids
        .windows(2)
        .map(|w| EdgeShape {
            from: w[0].clone(),
            to: w[1].clone(),
            condition: "default".into(),
        })
        .collect();

    Snapshot {
        graph_id: "prop-graph".into(),
        timestamp,
        graph_structure: GraphShape {
            name: "prop-graph".into(),
            nodes,
            edges,
            start_node: ids.first().cloned().unwrap_or_default(),
            end_nodes: ids.last().cloned().into_iter().collect(),
        },
        execution_state: ExecutionState {
            current_node: ids.last().cloned(),
            visited_nodes: ids.clone(),
            node_outputs,
            graph_input: json!(0),
            start_time: timestamp,
            status: "completed".into(),
        },
        node_states,
        context_data: ContextData {
            checkpoint_type: CheckpointType::Auto,
            checkpoint_number,
            extra: HashMap::new(),
        },
    }
}

proptest! {
    #[test]
    fn snapshot_json_round_trip_is_a_bijection(
        ids in prop::collection::vec(node_id_strategy(), 0..6)
            .prop_map(|v| { let mut seen = std::collections::HashSet::new(); v.into_iter().filter(|id| seen.insert(id.clone())).collect::<Vec<_>>() }),
        checkpoint_number in 0u64..10_000,
        epoch_secs in 0i64..2_000_000_000,
    ) {
        let snap = build_snapshot(ids, checkpoint_number, epoch_secs);
        let encoded = snap.to_json().unwrap();
        let restored = Snapshot::from_json(&encoded).unwrap();

        prop_assert_eq!(restored.graph_id, snap.graph_id);
        prop_assert_eq!(restored.timestamp, snap.timestamp);
        prop_assert_eq!(
            restored.execution_state.visited_nodes,
            snap.execution_state.visited_nodes
        );
        prop_assert_eq!(
            restored.execution_state.node_outputs,
            snap.execution_state.node_outputs
        );
        prop_assert_eq!(restored.node_states.len(), snap.node_states.len());
        for (id, state) in &snap.node_states {
            let restored_state = &restored.node_states[id];
            prop_assert_eq!(&restored_state.status, &state.status);
            prop_assert_eq!(&restored_state.result, &state.result);
            prop_assert_eq!(&restored_state.input_data, &state.input_data);
        }
        prop_assert_eq!(
            restored.context_data.checkpoint_number,
            snap.context_data.checkpoint_number
        );
        prop_assert_eq!(restored.checkpoint_type(), snap.checkpoint_type());
    }
}
