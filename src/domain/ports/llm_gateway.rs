//! LLM gateway port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// System prompt
    pub system: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Max tokens to generate (gateway default when unset)
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.2,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Text completion backend used by the LLM-backed generators and diagnoser.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Run one completion and return the response text.
    async fn complete(&self, request: LlmRequest) -> DomainResult<String>;
}
