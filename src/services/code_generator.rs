//! LLM-backed test and implementation generators.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GenerationContext, Node};
use crate::domain::ports::{ImplementationGenerator, LlmGateway, LlmRequest, TestGenerator};
use crate::services::llm_response::strip_code_fences;

const TEST_SYSTEM_PROMPT: &str = "You write focused pytest test files. \
Import the code under test with `from implementation import *`. \
Return only the test file inside a single code block.";

const IMPLEMENTATION_SYSTEM_PROMPT: &str = "You write implementations that make the given \
tests pass. Return only the implementation module inside a single code block.";

fn describe_node(node: &Node) -> String {
    let mut out = format!("Name: {}\nKind: {:?}", node.name, node.node_type);
    if let Some(signature) = &node.signature {
        out.push_str(&format!("\nSignature: {signature}"));
    }
    if let Some(docstring) = &node.docstring {
        out.push_str(&format!("\nDescription: {docstring}"));
    }
    if let Some(file_path) = &node.file_path {
        out.push_str(&format!("\nFile: {file_path}"));
    }
    out
}

fn code_from_response(response: &str, what: &str, node: &Node) -> DomainResult<String> {
    let code = strip_code_fences(response);
    if code.trim().is_empty() {
        return Err(DomainError::Generation(format!(
            "empty {what} returned for node {}",
            node.id
        )));
    }
    Ok(code)
}

/// Generates tests and implementations through one [`LlmGateway`].
pub struct LlmCodeGenerator {
    gateway: Arc<dyn LlmGateway>,
    temperature: f32,
}

impl LlmCodeGenerator {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            gateway,
            temperature: 0.2,
        }
    }

    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl TestGenerator for LlmCodeGenerator {
    #[instrument(skip_all, fields(node_id = %node.id))]
    async fn generate_tests(&self, node: &Node, context: &GenerationContext) -> DomainResult<String> {
        let prompt = format!(
            "Write tests for this unit.\n\n{}\n\n## Upstream code\n{}",
            describe_node(node),
            context.render()
        );
        let response = self
            .gateway
            .complete(
                LlmRequest::new(prompt)
                    .with_system(TEST_SYSTEM_PROMPT)
                    .with_temperature(self.temperature),
            )
            .await?;
        let code = code_from_response(&response, "test code", node)?;
        debug!(bytes = code.len(), "generated tests");
        Ok(code)
    }
}

#[async_trait]
impl ImplementationGenerator for LlmCodeGenerator {
    #[instrument(skip_all, fields(node_id = %node.id))]
    async fn generate_implementation(
        &self,
        node: &Node,
        test_code: &str,
        context: &GenerationContext,
    ) -> DomainResult<String> {
        let prompt = format!(
            "Implement this unit.\n\n{}\n\n## Upstream code\n{}\n\n## Tests to satisfy\n```\n{}\n```",
            describe_node(node),
            context.render(),
            test_code.trim_end()
        );
        let response = self
            .gateway
            .complete(
                LlmRequest::new(prompt)
                    .with_system(IMPLEMENTATION_SYSTEM_PROMPT)
                    .with_temperature(self.temperature),
            )
            .await?;
        let code = code_from_response(&response, "implementation", node)?;
        debug!(bytes = code.len(), "generated implementation");
        Ok(code)
    }
}
