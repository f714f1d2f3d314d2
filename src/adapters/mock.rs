//! In-memory collaborators for tests and `--dry-run`.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DiagnosisResult, FailureClassification, GenerationContext, Node, NodeId, SandboxResult,
};
use crate::domain::ports::{
    Diagnoser, ImplementationGenerator, LlmGateway, LlmRequest, SandboxExecutor, TestGenerator,
};

/// Shared call counter handed out before a mock is moved into an `Arc<dyn _>`.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// LLM gateway
// ---------------------------------------------------------------------------

/// Gateway that replays queued responses, then a default.
pub struct MockLlmGateway {
    queued: Mutex<VecDeque<DomainResult<String>>>,
    default_response: Option<String>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmGateway {
    /// Always answer `response`.
    pub fn with_default(response: impl Into<String>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default_response: Some(response.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer from `responses` in order and fail once they run out.
    pub fn with_responses(responses: Vec<DomainResult<String>>) -> Self {
        Self {
            queued: Mutex::new(responses.into()),
            default_response: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmGateway for MockLlmGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, request: LlmRequest) -> DomainResult<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let next = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(response) => response,
            None => self
                .default_response
                .clone()
                .ok_or_else(|| DomainError::Llm("mock gateway has no responses left".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Code generation
// ---------------------------------------------------------------------------

/// Node id and the dependency ids its context carried.
pub type SeenContext = (NodeId, Vec<NodeId>);

/// Deterministic placeholder generator.
#[derive(Debug, Clone, Default)]
pub struct MockCodeGenerator {
    test_error: Option<String>,
    implementation_error: Option<String>,
    seen_contexts: Arc<Mutex<Vec<SeenContext>>>,
}

impl MockCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_tests(mut self, message: impl Into<String>) -> Self {
        self.test_error = Some(message.into());
        self
    }

    pub fn failing_implementation(mut self, message: impl Into<String>) -> Self {
        self.implementation_error = Some(message.into());
        self
    }

    /// Contexts received by `generate_tests`, in call order.
    pub fn seen_contexts(&self) -> Arc<Mutex<Vec<SeenContext>>> {
        Arc::clone(&self.seen_contexts)
    }

    pub fn tests_for(&self, node: &Node) -> String {
        format!(
            "from implementation import {0}\n\n\ndef test_{0}():\n    assert {0} is not None\n",
            node.name
        )
    }

    pub fn implementation_for(&self, node: &Node) -> String {
        format!("def {}(*args, **kwargs):\n    return None\n", node.name)
    }
}

#[async_trait]
impl TestGenerator for MockCodeGenerator {
    async fn generate_tests(&self, node: &Node, context: &GenerationContext) -> DomainResult<String> {
        let dependencies: Vec<NodeId> =
            context.dependencies.iter().map(|d| d.node_id.clone()).collect();
        self.seen_contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((node.id.clone(), dependencies));
        match &self.test_error {
            Some(message) => Err(DomainError::Generation(message.clone())),
            None => Ok(self.tests_for(node)),
        }
    }
}

#[async_trait]
impl ImplementationGenerator for MockCodeGenerator {
    async fn generate_implementation(
        &self,
        node: &Node,
        _test_code: &str,
        _context: &GenerationContext,
    ) -> DomainResult<String> {
        match &self.implementation_error {
            Some(message) => Err(DomainError::Generation(message.clone())),
            None => Ok(self.implementation_for(node)),
        }
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum SandboxMode {
    Pass,
    Fail,
    Error(String),
}

/// Sandbox that reports canned results without running anything.
#[derive(Debug)]
pub struct MockSandbox {
    mode: SandboxMode,
    script: Mutex<VecDeque<SandboxResult>>,
    failing_nodes: HashSet<NodeId>,
    calls: CallCounter,
    seen_implementations: Arc<Mutex<Vec<String>>>,
}

impl MockSandbox {
    fn with_mode(mode: SandboxMode) -> Self {
        Self {
            mode,
            script: Mutex::new(VecDeque::new()),
            failing_nodes: HashSet::new(),
            calls: CallCounter::default(),
            seen_implementations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every run passes.
    pub fn passing() -> Self {
        Self::with_mode(SandboxMode::Pass)
    }

    /// Every run has failing tests.
    pub fn failing() -> Self {
        Self::with_mode(SandboxMode::Fail)
    }

    /// Every run raises an executor error.
    pub fn erroring(message: impl Into<String>) -> Self {
        Self::with_mode(SandboxMode::Error(message.into()))
    }

    /// Replay `results` in order, then pass.
    pub fn scripted(results: Vec<SandboxResult>) -> Self {
        let sandbox = Self::passing();
        *sandbox.script.lock().unwrap_or_else(PoisonError::into_inner) = results.into();
        sandbox
    }

    /// Runs for these nodes always fail, whatever the mode.
    pub fn with_failing_nodes<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.failing_nodes.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn call_counter(&self) -> CallCounter {
        self.calls.clone()
    }

    /// Implementations passed to `execute`, in call order.
    pub fn seen_implementations(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.seen_implementations)
    }

    fn passed_result() -> SandboxResult {
        SandboxResult {
            passed: 1,
            stdout: "1 passed".to_string(),
            duration_ms: 1,
            ..SandboxResult::default()
        }
    }

    fn failed_result(node: &Node) -> SandboxResult {
        SandboxResult {
            failed: 1,
            stdout: format!("FAILED test_{0} - AssertionError\n1 failed", node.name),
            duration_ms: 1,
            ..SandboxResult::default()
        }
    }
}

#[async_trait]
impl SandboxExecutor for MockSandbox {
    async fn execute(
        &self,
        implementation: &str,
        _test_code: &str,
        node: &Node,
    ) -> DomainResult<SandboxResult> {
        self.calls.bump();
        self.seen_implementations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(implementation.to_string());

        if self.failing_nodes.contains(&node.id) {
            return Ok(Self::failed_result(node));
        }
        if let Some(result) = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Ok(result);
        }
        match &self.mode {
            SandboxMode::Pass => Ok(Self::passed_result()),
            SandboxMode::Fail => Ok(Self::failed_result(node)),
            SandboxMode::Error(message) => Err(DomainError::Execution(message.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnoser
// ---------------------------------------------------------------------------

/// Diagnoser that always gives the same verdict.
#[derive(Debug, Clone)]
pub struct MockDiagnoser {
    classification: FailureClassification,
    fix: Option<String>,
    error: Option<String>,
    calls: CallCounter,
}

impl MockDiagnoser {
    pub fn new(classification: FailureClassification) -> Self {
        Self {
            classification,
            fix: None,
            error: None,
            calls: CallCounter::default(),
        }
    }

    /// Every call fails.
    pub fn erroring(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(FailureClassification::ImplementationBug)
        }
    }

    /// Fixed code attached to the blamed artifact.
    pub fn with_fix(mut self, code: impl Into<String>) -> Self {
        self.fix = Some(code.into());
        self
    }

    pub fn call_counter(&self) -> CallCounter {
        self.calls.clone()
    }
}

#[async_trait]
impl Diagnoser for MockDiagnoser {
    async fn diagnose_and_fix(
        &self,
        _node: &Node,
        _implementation: &str,
        _test_code: &str,
        _error_output: &str,
        _context: &GenerationContext,
    ) -> DomainResult<DiagnosisResult> {
        self.calls.bump();
        if let Some(message) = &self.error {
            return Err(DomainError::Diagnosis(message.clone()));
        }
        let blame = |wanted: FailureClassification| self.fix.clone().filter(|_| self.classification == wanted);
        Ok(DiagnosisResult {
            classification: self.classification,
            fixed_implementation: blame(FailureClassification::ImplementationBug),
            fixed_test_code: blame(FailureClassification::TestBug),
            explanation: format!("mock diagnosis: {}", self.classification),
        })
    }
}
