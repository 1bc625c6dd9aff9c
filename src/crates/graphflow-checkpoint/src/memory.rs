//! [`InMemoryCheckpointSaver`] — a reference [`CheckpointSaver`] for
//! development, testing, and small-scale runs.
//!
//! Storage shape follows `langgraph-checkpoint::memory::MemoryCheckpointer`'s
//! `Arc<RwLock<HashMap<…>>>` approach.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::traits::CheckpointSaver;

/// Stores every snapshot for every graph id in memory, oldest first. Nothing
/// is persisted across process restarts.
#[derive(Default)]
pub struct InMemoryCheckpointSaver {
    snapshots: RwLock<HashMap<String, Vec<Snapshot>>>,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        InMemoryCheckpointSaver {
            snapshots: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn save(&self, snapshot: Snapshot) -> Result<()> {
        let mut guard = self.snapshots.write().unwrap();
        guard.entry(snapshot.graph_id.clone()).or_default().push(snapshot);
        Ok(())
    }

    async fn latest(&self, graph_id: &str) -> Result<Option<Snapshot>> {
        let guard = self.snapshots.read().unwrap();
        Ok(guard.get(graph_id).and_then(|v| v.last().cloned()))
    }

    async fn list(&self, graph_id: &str) -> Result<Vec<Snapshot>> {
        let guard = self.snapshots.read().unwrap();
        Ok(guard.get(graph_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, graph_id: &str) -> Result<()> {
        let mut guard = self.snapshots.write().unwrap();
        guard.remove(graph_id);
        Ok(())
    }
}
