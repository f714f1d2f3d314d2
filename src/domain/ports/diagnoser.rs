//! Failure diagnosis port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DiagnosisResult, GenerationContext, Node};

/// Classifies a failing execution and proposes a fix.
///
/// Errors are logged by the TDD loop, which then retries with unchanged
/// artifacts.
#[async_trait]
pub trait Diagnoser: Send + Sync {
    async fn diagnose_and_fix(
        &self,
        node: &Node,
        implementation: &str,
        test_code: &str,
        error_output: &str,
        context: &GenerationContext,
    ) -> DomainResult<DiagnosisResult>;
}
