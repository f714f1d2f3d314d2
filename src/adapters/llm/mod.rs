//! LLM gateway adapters.

pub mod anthropic_api;

pub use anthropic_api::AnthropicGateway;
