//! rpg-forge - graph-guided TDD code generation
//!
//! rpg-forge walks a planning graph (modules, components and the functions
//! beneath them) in dependency order and drives a test-first loop for every
//! leaf: generate tests, generate an implementation, run both in a sandbox,
//! and on failure let a majority vote of diagnoses decide what to fix.
//! Progress is checkpointed so an interrupted run resumes where it stopped.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): graph, generation state and collaborator ports
//! - **Service Layer** (`services`): scheduler, checkpoints, TDD loop, diagnosis, orchestrator
//! - **Adapters** (`adapters`): Anthropic gateway, process sandbox, in-memory mocks
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, file persistence
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rpg_forge::adapters::mock::{MockCodeGenerator, MockDiagnoser, MockSandbox};
//! use rpg_forge::services::{CheckpointManager, GenerationOrchestrator, OrchestratorConfig, TddLoop};
//!
//! let generator = Arc::new(MockCodeGenerator::new());
//! let tdd = TddLoop::new(generator.clone(), generator, Arc::new(MockSandbox::passing()),
//!     Arc::new(MockDiagnoser::new(FailureClassification::ImplementationBug)));
//! let checkpoints = CheckpointManager::new("checkpoint.json", 3);
//! let state = checkpoints.fresh_state();
//! let result = GenerationOrchestrator::new(graph, state, tdd, checkpoints, OrchestratorConfig::default())
//!     .run()
//!     .await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, Edge, EdgeType, GenerationState, Graph, LoggingConfig, Node, NodeId, NodeStatus,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    CheckpointManager, GenerationOrchestrator, OrchestratorConfig, OrchestratorResult, Scheduler,
    TddLoop,
};
