pub mod checkpoint_manager;
pub mod code_generator;
pub mod llm_response;
pub mod majority_vote;
pub mod orchestrator;
pub mod tdd_loop;
pub mod traversal;

pub use checkpoint_manager::CheckpointManager;
pub use code_generator::LlmCodeGenerator;
pub use majority_vote::{tally_votes, DiagnosisVote, MajorityVoteDiagnoser};
pub use orchestrator::{
    GenerationOrchestrator, NodeOutcome, OrchestratorConfig, OrchestratorEvent, OrchestratorResult,
};
pub use tdd_loop::{TddLoop, TddResult};
pub use traversal::{ComponentReport, GenerationReport, Scheduler};
