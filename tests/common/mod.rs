//! Common test utilities for integration tests
//!
//! Shared plan graphs and orchestrator wiring used across the integration
//! test files.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use rpg_forge::adapters::mock::{MockCodeGenerator, MockDiagnoser, MockSandbox};
use rpg_forge::domain::models::{Edge, EdgeType, FailureClassification, Graph, Node, NodeId};
use rpg_forge::services::{
    CheckpointManager, GenerationOrchestrator, OrchestratorConfig, TddLoop,
};
use tempfile::TempDir;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

/// Module → Component → {F1, F2}, data flow F1 → F2.
pub fn plan_graph() -> Graph {
    let mut graph = Graph::new();
    graph.add_node(Node::module("module", "core")).unwrap();
    graph
        .add_node(Node::component("component", "parser").with_parent("module"))
        .unwrap();
    graph
        .add_node(
            Node::function("f1", "tokenize")
                .with_parent("component")
                .with_signature("def tokenize(source: str) -> list[str]"),
        )
        .unwrap();
    graph
        .add_node(
            Node::function("f2", "parse")
                .with_parent("component")
                .with_signature("def parse(tokens: list[str]) -> dict"),
        )
        .unwrap();
    graph
        .add_edge(Edge::new("module", "component", EdgeType::Hierarchy).unwrap())
        .unwrap();
    graph
        .add_edge(Edge::new("component", "f1", EdgeType::Hierarchy).unwrap())
        .unwrap();
    graph
        .add_edge(Edge::new("component", "f2", EdgeType::Hierarchy).unwrap())
        .unwrap();
    graph
        .add_edge(Edge::data_flow("f1", "f2", "tokens", "list[str]", None).unwrap())
        .unwrap();
    graph
}

/// TDD loop over mock generators with the given sandbox.
pub fn mock_tdd(sandbox: MockSandbox) -> TddLoop {
    mock_tdd_with(MockCodeGenerator::new(), sandbox)
}

/// TDD loop over `generator` with the given sandbox.
pub fn mock_tdd_with(generator: MockCodeGenerator, sandbox: MockSandbox) -> TddLoop {
    let generator = Arc::new(generator);
    TddLoop::new(
        generator.clone(),
        generator,
        Arc::new(sandbox),
        Arc::new(MockDiagnoser::new(FailureClassification::ImplementationBug)),
    )
}

/// Orchestrator with a fresh state checkpointed under `dir`.
pub fn orchestrator(
    graph: Graph,
    sandbox: MockSandbox,
    checkpoint: &Path,
    max_retries: u32,
    config: OrchestratorConfig,
) -> GenerationOrchestrator {
    let checkpoints = CheckpointManager::new(checkpoint, max_retries);
    let state = checkpoints.fresh_state();
    GenerationOrchestrator::new(graph, state, mock_tdd(sandbox), checkpoints, config)
}
