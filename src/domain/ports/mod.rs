//! Port trait definitions (Hexagonal Architecture)
//!
//! Collaborators the generation engine drives but does not implement:
//! - TestGenerator / ImplementationGenerator: produce code for a node
//! - SandboxExecutor: run tests against an implementation in isolation
//! - Diagnoser: classify a failing run and propose a fix
//! - LlmGateway: raw completion requests used by the LLM-backed services
//!
//! Each is injected as `Arc<dyn Trait>` at construction.

pub mod diagnoser;
pub mod generator;
pub mod llm_gateway;
pub mod sandbox;

pub use diagnoser::Diagnoser;
pub use generator::{ImplementationGenerator, TestGenerator};
pub use llm_gateway::{LlmGateway, LlmRequest};
pub use sandbox::SandboxExecutor;
