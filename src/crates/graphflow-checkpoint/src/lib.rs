//! Snapshot capture, storage, and resume for `graphflow-core` executions.
//!
//! A [`snapshot::Snapshot`] is an immutable capture of a run's graph shape,
//! execution-context state, and per-node state, sufficient to resume a graph
//! run elsewhere or later. This crate owns the wire format and the storage
//! abstraction ([`traits::CheckpointSaver`]); `graphflow-core` drives capture
//! and resume against the live [`crate::traits::CheckpointSaver`] object it is
//! configured with.
//!
//! ```
//! use graphflow_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
//! # use graphflow_checkpoint::{Snapshot, GraphShape, ExecutionState, ContextData, CheckpointType};
//! # use std::collections::HashMap;
//! # use serde_json::Value;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let saver = InMemoryCheckpointSaver::new();
//! // ... build and save a Snapshot produced by a GraphExecutor run ...
//! let _ = saver.latest("some-graph").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use snapshot::{
    CheckpointType, ContextData, EdgeShape, ExecutionState, GraphShape, NodeShape, NodeState,
    Snapshot,
};
pub use traits::CheckpointSaver;
