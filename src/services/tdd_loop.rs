//! Per-node generate → execute → diagnose → retry loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::models::{
    DiagnosisResult, FailureClassification, GenerationContext, GenerationState, Node, NodeId,
    NodeStatus, SandboxResult,
};
use crate::domain::ports::{Diagnoser, ImplementationGenerator, SandboxExecutor, TestGenerator};

/// Outcome of one [`TddLoop::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddResult {
    pub node_id: NodeId,
    pub success: bool,
    /// Sandbox executions performed.
    pub iterations: u32,
    /// Final implementation, kept on failure for inspection.
    pub implementation: String,
    /// Final test code, kept on failure for inspection.
    pub test_code: String,
    pub last_execution: Option<SandboxResult>,
    pub diagnoses: Vec<DiagnosisResult>,
    pub error: Option<String>,
}

impl TddResult {
    fn without_runs(node_id: &NodeId, test_code: String, error: String) -> Self {
        Self {
            node_id: node_id.clone(),
            success: false,
            iterations: 0,
            implementation: String::new(),
            test_code,
            last_execution: None,
            diagnoses: Vec::new(),
            error: Some(error),
        }
    }
}

/// Drives the collaborators for one node at a time.
pub struct TddLoop {
    test_generator: Arc<dyn TestGenerator>,
    implementation_generator: Arc<dyn ImplementationGenerator>,
    executor: Arc<dyn SandboxExecutor>,
    diagnoser: Arc<dyn Diagnoser>,
}

impl TddLoop {
    pub fn new(
        test_generator: Arc<dyn TestGenerator>,
        implementation_generator: Arc<dyn ImplementationGenerator>,
        executor: Arc<dyn SandboxExecutor>,
        diagnoser: Arc<dyn Diagnoser>,
    ) -> Self {
        Self {
            test_generator,
            implementation_generator,
            executor,
            diagnoser,
        }
    }

    /// Run the loop for `node`, recording every transition in `state`.
    ///
    /// Runs at most `max_retries` minus the retries the node already spent.
    /// A generator error fails the node at once without using retries. An
    /// executor error counts as a failing run. A diagnoser error leaves the
    /// artifacts unchanged for the next iteration.
    #[instrument(skip_all, fields(node_id = %node.id, max_retries = state.max_retries()))]
    pub async fn run(
        &self,
        node: &Node,
        context: &GenerationContext,
        state: &mut GenerationState,
    ) -> TddResult {
        let node_id = &node.id;
        let max_retries = state.max_retries();
        // A node interrupted mid-loop keeps the retries it already spent.
        let budget = max_retries.saturating_sub(state.retry_count_of(node_id));
        if budget == 0 {
            let reason = format!("exhausted {max_retries} retries");
            state.set_status(node_id, NodeStatus::Failed, Some(reason.clone()));
            warn!(%reason, "no retry budget left");
            return TddResult::without_runs(node_id, String::new(), reason);
        }
        state.set_status(node_id, NodeStatus::InProgress, None);

        let mut test_code = match self.test_generator.generate_tests(node, context).await {
            Ok(code) => code,
            Err(err) => {
                let reason = format!("test generation failed: {err}");
                warn!(%reason, "generation error, not retrying");
                state.set_status(node_id, NodeStatus::Failed, Some(reason.clone()));
                return TddResult::without_runs(node_id, String::new(), reason);
            }
        };

        let mut implementation = match self
            .implementation_generator
            .generate_implementation(node, &test_code, context)
            .await
        {
            Ok(code) => code,
            Err(err) => {
                let reason = format!("implementation generation failed: {err}");
                warn!(%reason, "generation error, not retrying");
                state.set_status(node_id, NodeStatus::Failed, Some(reason.clone()));
                return TddResult::without_runs(node_id, test_code, reason);
            }
        };

        let mut diagnoses = Vec::new();
        let mut last_execution = None;

        for iteration in 1..=budget {
            let execution = match self.executor.execute(&implementation, &test_code, node).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(iteration, error = %err, "sandbox could not run");
                    SandboxResult::infrastructure_failure(err.to_string())
                }
            };
            state.update_test_results(node_id, execution.passed, execution.failed + execution.errors);

            if execution.all_passed() {
                state.set_status(node_id, NodeStatus::Passed, None);
                info!(iteration, passed = execution.passed, "tests passed");
                return TddResult {
                    node_id: node_id.clone(),
                    success: true,
                    iterations: iteration,
                    implementation,
                    test_code,
                    last_execution: Some(execution),
                    diagnoses,
                    error: None,
                };
            }

            let retries = state.increment_retry(node_id);
            debug!(
                iteration,
                retries,
                passed = execution.passed,
                failed = execution.failed,
                errors = execution.errors,
                "tests failed"
            );

            if iteration < budget {
                match self
                    .diagnoser
                    .diagnose_and_fix(node, &implementation, &test_code, &execution.error_output(), context)
                    .await
                {
                    Ok(diagnosis) => {
                        match diagnosis.classification {
                            FailureClassification::ImplementationBug => {
                                if let Some(fixed) = &diagnosis.fixed_implementation {
                                    implementation.clone_from(fixed);
                                }
                            }
                            FailureClassification::TestBug => {
                                if let Some(fixed) = &diagnosis.fixed_test_code {
                                    test_code.clone_from(fixed);
                                }
                            }
                            // Transient: retry unchanged.
                            FailureClassification::Environment => {}
                        }
                        debug!(classification = %diagnosis.classification, "applied diagnosis");
                        diagnoses.push(diagnosis);
                    }
                    Err(err) => warn!(iteration, error = %err, "diagnosis failed, retrying unchanged"),
                }
            }

            last_execution = Some(execution);
        }

        let reason = format!("exhausted {max_retries} retries");
        state.set_status(node_id, NodeStatus::Failed, Some(reason.clone()));
        warn!(%reason, "node failed");

        TddResult {
            node_id: node_id.clone(),
            success: false,
            iterations: budget,
            implementation,
            test_code,
            last_execution,
            diagnoses,
            error: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockCodeGenerator, MockDiagnoser, MockSandbox};

    fn tdd(generator: MockCodeGenerator, sandbox: MockSandbox, diagnoser: MockDiagnoser) -> TddLoop {
        let generator = Arc::new(generator);
        TddLoop::new(generator.clone(), generator, Arc::new(sandbox), Arc::new(diagnoser))
    }

    fn node() -> Node {
        Node::function("f1", "tokenize")
    }

    #[tokio::test]
    async fn test_passes_on_first_iteration() {
        let sandbox = MockSandbox::passing();
        let runs = sandbox.call_counter();
        let tdd = tdd(MockCodeGenerator::new(), sandbox, MockDiagnoser::new(FailureClassification::ImplementationBug));
        let mut state = GenerationState::new(10, "cp.json");

        let result = tdd.run(&node(), &GenerationContext::new(), &mut state).await;

        assert!(result.success);
        assert_eq!(result.iterations, 1);
        assert_eq!(runs.get(), 1);
        let s = state.get(&node().id).unwrap();
        assert_eq!(s.status, NodeStatus::Passed);
        assert_eq!(s.retry_count, 0);
        assert!(s.test_results.passed > 0);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let diagnoser = MockDiagnoser::new(FailureClassification::Environment);
        let diagnoses = diagnoser.call_counter();
        let tdd = tdd(MockCodeGenerator::new(), MockSandbox::failing(), diagnoser);
        let mut state = GenerationState::new(3, "cp.json");

        let result = tdd.run(&node(), &GenerationContext::new(), &mut state).await;

        assert!(!result.success);
        assert_eq!(result.iterations, 3);
        assert!(result.error.as_deref().unwrap().contains("exhausted"));
        assert!(!result.implementation.is_empty());
        assert_eq!(diagnoses.get(), 2);
        let s = state.get(&node().id).unwrap();
        assert_eq!(s.status, NodeStatus::Failed);
        assert_eq!(s.retry_count, 3);
        assert_eq!(s.failure_reason.as_deref(), Some("exhausted 3 retries"));
    }

    #[tokio::test]
    async fn test_generation_error_is_not_retried() {
        let sandbox = MockSandbox::passing();
        let runs = sandbox.call_counter();
        let tdd = tdd(
            MockCodeGenerator::new().failing_tests("model unavailable"),
            sandbox,
            MockDiagnoser::new(FailureClassification::ImplementationBug),
        );
        let mut state = GenerationState::new(3, "cp.json");

        let result = tdd.run(&node(), &GenerationContext::new(), &mut state).await;

        assert!(!result.success);
        assert_eq!(result.iterations, 0);
        assert_eq!(runs.get(), 0);
        let s = state.get(&node().id).unwrap();
        assert_eq!(s.status, NodeStatus::Failed);
        assert_eq!(s.retry_count, 0);
        assert!(s.failure_reason.as_deref().unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_implementation_fix_is_applied() {
        let sandbox = MockSandbox::scripted(vec![
            SandboxResult { failed: 1, ..SandboxResult::default() },
            SandboxResult { passed: 2, ..SandboxResult::default() },
        ]);
        let seen = sandbox.seen_implementations();
        let diagnoser = MockDiagnoser::new(FailureClassification::ImplementationBug)
            .with_fix("def tokenize(s):\n    return s.split()");
        let tdd = tdd(MockCodeGenerator::new(), sandbox, diagnoser);
        let mut state = GenerationState::new(3, "cp.json");

        let result = tdd.run(&node(), &GenerationContext::new(), &mut state).await;

        assert!(result.success);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.diagnoses.len(), 1);
        assert_eq!(result.implementation, "def tokenize(s):\n    return s.split()");
        assert_eq!(seen.lock().unwrap()[1], result.implementation);
        assert_eq!(state.retry_count_of(&node().id), 1);
    }

    #[tokio::test]
    async fn test_test_fix_replaces_only_tests() {
        let sandbox = MockSandbox::scripted(vec![
            SandboxResult { failed: 1, ..SandboxResult::default() },
            SandboxResult { passed: 1, ..SandboxResult::default() },
        ]);
        let diagnoser = MockDiagnoser::new(FailureClassification::TestBug).with_fix("def test_ok(): pass");
        let generator = MockCodeGenerator::new();
        let original_impl = generator.implementation_for(&node());
        let tdd = tdd(generator, sandbox, diagnoser);
        let mut state = GenerationState::new(3, "cp.json");

        let result = tdd.run(&node(), &GenerationContext::new(), &mut state).await;

        assert!(result.success);
        assert_eq!(result.test_code, "def test_ok(): pass");
        assert_eq!(result.implementation, original_impl);
    }

    #[tokio::test]
    async fn test_executor_and_diagnoser_errors_flow_through_retries() {
        let tdd = tdd(
            MockCodeGenerator::new(),
            MockSandbox::erroring("container runtime missing"),
            MockDiagnoser::erroring("diagnosis backend down"),
        );
        let mut state = GenerationState::new(2, "cp.json");

        let result = tdd.run(&node(), &GenerationContext::new(), &mut state).await;

        assert!(!result.success);
        assert_eq!(result.iterations, 2);
        assert!(result.diagnoses.is_empty());
        let last = result.last_execution.unwrap();
        assert_eq!(last.errors, 1);
        assert!(last.stderr.contains("container runtime missing"));
        assert_eq!(state.retry_count_of(&node().id), 2);
    }

    #[tokio::test]
    async fn test_interrupted_node_keeps_spent_retries() {
        let sandbox = MockSandbox::failing();
        let runs = sandbox.call_counter();
        let diagnoser = MockDiagnoser::new(FailureClassification::ImplementationBug);
        let diagnoses = diagnoser.call_counter();
        let tdd = tdd(MockCodeGenerator::new(), sandbox, diagnoser);
        let mut state = GenerationState::new(3, "cp.json");
        state.increment_retry(&node().id);
        state.increment_retry(&node().id);
        state.set_status(&node().id, NodeStatus::InProgress, None);

        let result = tdd.run(&node(), &GenerationContext::new(), &mut state).await;

        assert!(!result.success);
        assert_eq!(result.iterations, 1);
        assert_eq!(runs.get(), 1);
        assert_eq!(diagnoses.get(), 0);
        let s = state.get(&node().id).unwrap();
        assert_eq!(s.status, NodeStatus::Failed);
        assert_eq!(s.retry_count, 3);
        assert_eq!(s.failure_reason.as_deref(), Some("exhausted 3 retries"));
    }

    #[tokio::test]
    async fn test_no_budget_left_skips_collaborators() {
        let sandbox = MockSandbox::passing();
        let runs = sandbox.call_counter();
        let tdd = tdd(
            MockCodeGenerator::new().failing_tests("must not be called"),
            sandbox,
            MockDiagnoser::new(FailureClassification::ImplementationBug),
        );
        let mut state = GenerationState::new(2, "cp.json");
        state.increment_retry(&node().id);
        state.increment_retry(&node().id);
        state.set_status(&node().id, NodeStatus::InProgress, None);

        let result = tdd.run(&node(), &GenerationContext::new(), &mut state).await;

        assert!(!result.success);
        assert_eq!(result.iterations, 0);
        assert_eq!(runs.get(), 0);
        assert_eq!(result.error.as_deref(), Some("exhausted 2 retries"));
        assert_eq!(state.status_of(&node().id), NodeStatus::Failed);
        assert_eq!(state.retry_count_of(&node().id), 2);
    }
}
