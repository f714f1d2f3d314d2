//! Sandbox executor port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Node, SandboxResult};

/// Runs generated tests against a generated implementation in isolation.
///
/// Returning a failing [`SandboxResult`] is a retryable outcome. Returning
/// `Err` means the executor itself could not run; callers turn that into a
/// synthetic failing result. Any time limit is the executor's concern.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(
        &self,
        implementation: &str,
        test_code: &str,
        node: &Node,
    ) -> DomainResult<SandboxResult>;
}
