//! Domain models

pub mod config;
pub mod execution;
pub mod generation_state;
pub mod graph;

pub use config::{
    Config, DiagnosisConfig, GenerationConfig, LlmConfig, LogFormat, LoggingConfig,
    RotationPolicy, SandboxConfig,
};
pub use execution::{
    DependencyCode, DiagnosisResult, FailureClassification, GenerationContext, SandboxResult,
};
pub use generation_state::{
    GenerationState, NodeGenerationState, NodeStatus, StatusSummary, TestTally,
};
pub use graph::{Edge, EdgeId, EdgeType, Graph, Node, NodeId, NodeLevel, NodeType};
