//! The [`CheckpointSaver`] storage abstraction.
//!
//! Grounded on `langgraph-checkpoint::traits::Checkpointer`
//! async trait shape (object-safe, `async_trait`, keyed lookup plus listing),
//! narrowed to a single `graph_id`-keyed, sequence-ordered store rather
//! than thread/namespace-keyed versioning.

use async_trait::async_trait;

use crate::error::Result;
use crate::snapshot::Snapshot;

/// Persists and retrieves [`Snapshot`]s for a graph run. Implementors choose
/// the backing store; `graphflow-core` depends only on this trait.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Persist `snapshot`, keyed by its `graph_id` and the run's monotonically
    /// increasing `checkpoint_number`.
    async fn save(&self, snapshot: Snapshot) -> Result<()>;

    /// The most recent snapshot for `graph_id`, if any.
    async fn latest(&self, graph_id: &str) -> Result<Option<Snapshot>>;

    /// All snapshots for `graph_id`, oldest first.
    async fn list(&self, graph_id: &str) -> Result<Vec<Snapshot>>;

    /// Remove every snapshot for `graph_id`.
    async fn clear(&self, graph_id: &str) -> Result<()>;
}
