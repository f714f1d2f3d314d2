//! Domain errors for the rpg-forge generation engine.

use std::path::PathBuf;

use thiserror::Error;

use super::models::{EdgeId, NodeId};

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[NodeId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors that can occur while planning or generating code.
///
/// Node-level outcomes (a test that never passes, a generator that raises)
/// are recorded in generation state rather than surfaced here. Only
/// structural, checkpoint and collaborator errors travel as `DomainError`.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("Node already exists: {0}")]
    DuplicateNode(NodeId),

    #[error("Self-loop edge rejected: {0} -> {0}")]
    SelfLoop(NodeId),

    #[error("Edge {edge} references missing node {node}")]
    DanglingEdge { edge: EdgeId, node: NodeId },

    #[error("Dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<NodeId>),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Checkpoint not found: {}", .0.display())]
    CheckpointNotFound(PathBuf),

    #[error("Checkpoint {} is corrupt: {reason}", .path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Diagnosis failed: {0}")]
    Diagnosis(String),

    #[error("LLM request failed: {0}")]
    Llm(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
