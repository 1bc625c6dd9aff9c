//! Error types for checkpoint operations.

use thiserror::Error;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors produced while saving, loading, or (de)serializing a
/// [`crate::snapshot::Snapshot`].
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No snapshot exists for the requested graph id.
    #[error("no snapshot found for graph '{0}'")]
    NotFound(String),

    /// JSON (de)serialization of a snapshot failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary (de)serialization of a snapshot failed.
    #[error("binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// The backing store (memory, disk, database) failed independently of
    /// serialization.
    #[error("storage error: {0}")]
    Storage(String),

    /// A snapshot's shape was internally inconsistent (not a node-level
    /// mismatch, which resume skips silently, but a gross
    /// incompatibility such as a missing required field).
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}
