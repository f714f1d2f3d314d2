//! Adapters for the collaborators the generation engine drives.

pub mod llm;
pub mod mock;
pub mod sandbox;
