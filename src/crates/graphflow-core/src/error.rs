//! Error types for graph construction and execution.
//!
//! One variant per row of the error-kinds table: [`GraphflowError::Validation`],
//! [`GraphflowError::NodeExecution`], [`GraphflowError::MissingEdge`],
//! [`GraphflowError::JoinStarvation`], [`GraphflowError::IterationCeilingExceeded`],
//! [`GraphflowError::Cancelled`], and [`GraphflowError::Snapshot`]. Most of these are
//! surfaced as diagnostics in the execution context rather than returned to the
//! caller — see [`crate::context::ExecutionContext`] — but they share this enum so
//! that every fallible entrypoint has one error type to reason about.

use thiserror::Error;

/// Result type used throughout `graphflow-core`.
pub type Result<T> = std::result::Result<T, GraphflowError>;

/// Errors produced while building, validating, or executing a [`crate::graph::Graph`].
#[derive(Error, Debug)]
pub enum GraphflowError {
    /// Raised by [`crate::graph::Graph::validate`] before any node runs.
    #[error("graph validation failed: {0}")]
    Validation(String),

    /// A node's `prep`, `exec`, or `post` returned an error.
    #[error("node '{node}' failed: {source}")]
    NodeExecution {
        /// The failing node's id.
        node: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A node's `post` returned an action with no matching outgoing edge.
    #[error("node '{node}' has no outgoing edge for action '{action}'")]
    MissingEdge {
        /// The node whose `post` produced the unmatched action.
        node: String,
        /// The action string that had no match.
        action: String,
    },

    /// The ready-queue drained with one or more join nodes still holding partial
    /// input. Never returned to a caller; recorded as a diagnostic on the final
    /// [`crate::context::ExecutionContext`].
    #[error("join node '{node}' starved: received {received}/{expected} inputs")]
    JoinStarvation {
        /// The join node id.
        node: String,
        /// Number of predecessor inputs actually collated.
        received: usize,
        /// Declared in-degree of the join node.
        expected: usize,
    },

    /// The executor's iteration ceiling was hit before the queue drained.
    #[error("iteration ceiling ({ceiling}) exceeded")]
    IterationCeilingExceeded {
        /// The configured ceiling.
        ceiling: usize,
    },

    /// A run was stopped cooperatively via [`crate::executor::GraphExecutor::pause`],
    /// a [`crate::exception::Timeout`] deadline, or an `__exit__` sentinel.
    #[error("execution cancelled: {0}")]
    Cancelled(String),

    /// Snapshot capture or resume failed. Wraps `graphflow_checkpoint::CheckpointError`
    /// for gross incompatibilities; node-level mismatches are skipped silently per
    /// the resume contract and never reach this variant.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] graphflow_checkpoint::CheckpointError),

    /// Serialization/deserialization of a declarative graph description failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML-specific serialization failure, kept distinct from JSON's since the two
    /// crates report errors differently and callers often branch on format.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GraphflowError {
    /// Build a [`GraphflowError::NodeExecution`] from any boxed error.
    pub fn node_execution(
        node: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        GraphflowError::NodeExecution {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Build a [`GraphflowError::MissingEdge`].
    pub fn missing_edge(node: impl Into<String>, action: impl Into<String>) -> Self {
        GraphflowError::MissingEdge {
            node: node.into(),
            action: action.into(),
        }
    }
}
