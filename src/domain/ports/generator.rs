//! Code generation ports.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{GenerationContext, Node};

/// Produces test code for a node.
///
/// An `Err` here is treated as a systemic failure: the node is marked
/// failed immediately and not retried.
#[async_trait]
pub trait TestGenerator: Send + Sync {
    async fn generate_tests(&self, node: &Node, context: &GenerationContext) -> DomainResult<String>;
}

/// Produces an implementation that should satisfy the given tests.
#[async_trait]
pub trait ImplementationGenerator: Send + Sync {
    async fn generate_implementation(
        &self,
        node: &Node,
        test_code: &str,
        context: &GenerationContext,
    ) -> DomainResult<String>;
}
