//! Whole-graph generation driver.
//!
//! Walks the scheduled order one node at a time, runs the TDD loop for every
//! node that still needs work, propagates failures, and checkpoints the
//! generation state periodically and once more on the way out. Generated code
//! is saved beside every checkpoint and restored for passed nodes on resume.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DependencyCode, GenerationConfig, GenerationContext, GenerationState, Graph, NodeId,
    NodeStatus,
};
use crate::services::checkpoint_manager::CheckpointManager;
use crate::services::tdd_loop::TddLoop;
use crate::services::traversal::{GenerationReport, Scheduler};

/// Orchestrator tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Log progress every N processed nodes.
    pub progress_interval: usize,
    /// Save a checkpoint every N processed nodes.
    pub checkpoint_interval: usize,
    /// Stop the run at the first node that fails permanently.
    pub fail_fast: bool,
    /// Only schedule generation leaves.
    pub leaf_only: bool,
    /// Reset this node and its descendants before running.
    pub start_from: Option<NodeId>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

impl From<&GenerationConfig> for OrchestratorConfig {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            progress_interval: config.progress_interval,
            checkpoint_interval: config.checkpoint_interval,
            fail_fast: config.fail_fast,
            leaf_only: config.leaf_only,
            start_from: None,
        }
    }
}

/// Final state of one scheduled node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node_id: NodeId,
    pub name: String,
    pub status: NodeStatus,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    /// Whether the TDD loop ran for this node during this run.
    pub processed: bool,
}

/// Summary of an orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub total_nodes: usize,
    pub processed_nodes: usize,
    pub passed_nodes: usize,
    pub failed_nodes: usize,
    pub skipped_nodes: usize,
    pub pass_rate: f64,
    pub node_outcomes: Vec<NodeOutcome>,
    pub checkpoint_path: PathBuf,
    /// Stopped by the cancellation token.
    pub interrupted: bool,
    /// Stopped by fail-fast.
    pub aborted: bool,
    pub report: GenerationReport,
}

/// Progress notifications.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum OrchestratorEvent {
    Started { total: usize },
    NodeStarted { node_id: NodeId, name: String },
    NodeFinished { node_id: NodeId, status: NodeStatus },
    NodesSkipped { ids: Vec<NodeId> },
    CheckpointSaved { path: PathBuf },
    Completed { result: OrchestratorResult },
}

/// Owns the graph and generation state for the duration of a run.
pub struct GenerationOrchestrator {
    graph: Graph,
    state: GenerationState,
    scheduler: Scheduler,
    tdd: TddLoop,
    checkpoints: CheckpointManager,
    config: OrchestratorConfig,
    events: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
    cancellation: CancellationToken,
}

impl GenerationOrchestrator {
    pub fn new(
        graph: Graph,
        state: GenerationState,
        tdd: TddLoop,
        checkpoints: CheckpointManager,
        config: OrchestratorConfig,
    ) -> Self {
        let scheduler = Scheduler::new(&graph).with_leaf_only(config.leaf_only);
        Self {
            graph,
            state,
            scheduler,
            tdd,
            checkpoints,
            config,
            events: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token that stops the run at the next node boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn into_parts(self) -> (Graph, GenerationState) {
        (self.graph, self.state)
    }

    fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Already generated ancestors of `node_id`, in traversal order.
    fn build_context(&self, node_id: &NodeId, positions: &HashMap<NodeId, usize>) -> GenerationContext {
        let mut ancestors = self.scheduler.ancestors(node_id);
        ancestors.sort_by_key(|id| positions.get(id).copied().unwrap_or(usize::MAX));

        ancestors
            .iter()
            .filter_map(|id| self.graph.node(id))
            .filter_map(|node| {
                node.implementation.as_ref().map(|implementation| DependencyCode {
                    node_id: node.id.clone(),
                    name: node.name.clone(),
                    signature: node.signature.clone(),
                    implementation: implementation.clone(),
                })
            })
            .fold(GenerationContext::new(), GenerationContext::with_dependency)
    }

    /// Save the state, then the generated code it refers to.
    fn save_checkpoint(&self) -> DomainResult<()> {
        self.checkpoints.save_checkpoint(&self.state)?;
        self.checkpoints.save_artifacts(&self.graph)?;
        self.emit(OrchestratorEvent::CheckpointSaved {
            path: self.checkpoints.checkpoint_path().to_path_buf(),
        });
        Ok(())
    }

    /// Run generation over the scheduled order.
    ///
    /// Only structural and checkpoint errors are returned as `Err`; node
    /// failures are recorded in the state and summarized in the result.
    #[instrument(skip(self), fields(leaf_only = self.config.leaf_only, fail_fast = self.config.fail_fast))]
    pub async fn run(&mut self) -> DomainResult<OrchestratorResult> {
        let full_order = self.scheduler.compute_order()?;
        let order = self.scheduler.scheduled_order()?;
        let positions: HashMap<NodeId, usize> = full_order
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        if let Some(start) = self.config.start_from.clone() {
            let reset = self
                .checkpoints
                .resume_from_node(&self.scheduler, &mut self.state, &start)?;
            for id in &reset {
                if let Some(slot) = self.graph.node_mut(id) {
                    slot.implementation = None;
                    slot.test_code = None;
                }
            }
            info!(start = %start, reset = reset.len(), "restarting from node");
        }

        // Passed nodes from an earlier run feed their code to dependents.
        self.checkpoints.restore_artifacts(&mut self.graph, &self.state)?;

        info!(total = order.len(), "generation started");
        self.emit(OrchestratorEvent::Started { total: order.len() });

        let mut processed: Vec<NodeId> = Vec::new();
        let mut interrupted = false;
        let mut aborted = false;

        for node_id in &order {
            if self.cancellation.is_cancelled() {
                warn!(processed = processed.len(), "shutdown requested, stopping at node boundary");
                interrupted = true;
                break;
            }
            if !self.scheduler.should_process(&self.state, node_id) {
                continue;
            }

            let node = self
                .graph
                .node(node_id)
                .cloned()
                .ok_or_else(|| DomainError::NodeNotFound(node_id.clone()))?;
            let context = self.build_context(node_id, &positions);
            self.emit(OrchestratorEvent::NodeStarted {
                node_id: node_id.clone(),
                name: node.name.clone(),
            });

            let result = self.tdd.run(&node, &context, &mut self.state).await;
            processed.push(node_id.clone());

            if result.success {
                self.scheduler.mark_passed(&mut self.state, node_id);
                if let Some(slot) = self.graph.node_mut(node_id) {
                    slot.implementation = Some(result.implementation);
                    slot.test_code = Some(result.test_code);
                }
            } else {
                let skipped = self.scheduler.propagate_failure(&mut self.state, node_id);
                if !skipped.is_empty() {
                    self.emit(OrchestratorEvent::NodesSkipped { ids: skipped });
                }
            }
            self.emit(OrchestratorEvent::NodeFinished {
                node_id: node_id.clone(),
                status: self.state.status_of(node_id),
            });

            if !result.success && self.config.fail_fast {
                warn!(node_id = %node_id, "fail-fast: aborting run");
                aborted = true;
                break;
            }

            let done = processed.len();
            if self.config.progress_interval > 0 && done % self.config.progress_interval == 0 {
                let summary = self.state.summary();
                info!(
                    processed = done,
                    total = order.len(),
                    passed = summary.passed,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "generation progress"
                );
            }
            if self.config.checkpoint_interval > 0 && done % self.config.checkpoint_interval == 0 {
                self.save_checkpoint()?;
            }
        }

        self.save_checkpoint()?;

        let result = self.build_result(&order, &processed, interrupted, aborted);
        info!(
            total = result.total_nodes,
            processed = result.processed_nodes,
            passed = result.passed_nodes,
            failed = result.failed_nodes,
            skipped = result.skipped_nodes,
            interrupted,
            aborted,
            "generation finished"
        );
        self.emit(OrchestratorEvent::Completed { result: result.clone() });
        Ok(result)
    }

    #[allow(clippy::cast_precision_loss)]
    fn build_result(
        &self,
        order: &[NodeId],
        processed: &[NodeId],
        interrupted: bool,
        aborted: bool,
    ) -> OrchestratorResult {
        let node_outcomes: Vec<NodeOutcome> = order
            .iter()
            .map(|id| {
                let state = self.state.get(id);
                NodeOutcome {
                    node_id: id.clone(),
                    name: self.scheduler.name_of(id).unwrap_or_default().to_string(),
                    status: self.state.status_of(id),
                    retry_count: self.state.retry_count_of(id),
                    failure_reason: state.and_then(|s| s.failure_reason.clone()),
                    processed: processed.contains(id),
                }
            })
            .collect();

        let count = |status: NodeStatus| node_outcomes.iter().filter(|o| o.status == status).count();
        let passed_nodes = count(NodeStatus::Passed);
        let total_nodes = order.len();

        OrchestratorResult {
            total_nodes,
            processed_nodes: processed.len(),
            passed_nodes,
            failed_nodes: count(NodeStatus::Failed),
            skipped_nodes: count(NodeStatus::Skipped),
            pass_rate: if total_nodes == 0 {
                0.0
            } else {
                passed_nodes as f64 / total_nodes as f64
            },
            node_outcomes,
            checkpoint_path: self.checkpoints.checkpoint_path().to_path_buf(),
            interrupted,
            aborted,
            report: self.scheduler.generate_report(&self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapters::mock::{MockCodeGenerator, MockDiagnoser, MockSandbox};
    use crate::domain::models::{Edge, EdgeType, FailureClassification, Node};
    use tempfile::TempDir;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    /// a → b (data flow), c independent.
    fn graph() -> Graph {
        let mut g = Graph::new();
        g.add_node(Node::function("a", "load").with_signature("def load(path)")).unwrap();
        g.add_node(Node::function("b", "parse")).unwrap();
        g.add_node(Node::function("c", "render")).unwrap();
        g.add_edge(Edge::new("a", "b", EdgeType::DataFlow).unwrap()).unwrap();
        g
    }

    fn orchestrator(dir: &TempDir, sandbox: MockSandbox, config: OrchestratorConfig) -> GenerationOrchestrator {
        let generator = Arc::new(MockCodeGenerator::new());
        let tdd = TddLoop::new(
            generator.clone(),
            generator,
            Arc::new(sandbox),
            Arc::new(MockDiagnoser::new(FailureClassification::ImplementationBug)),
        );
        let checkpoints = CheckpointManager::new(dir.path().join("cp.json"), 2);
        GenerationOrchestrator::new(graph(), checkpoints.fresh_state(), tdd, checkpoints, config)
    }

    #[tokio::test]
    async fn test_all_pass_populates_graph_and_checkpoints() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, MockSandbox::passing(), OrchestratorConfig::default());

        let result = orch.run().await.unwrap();

        assert_eq!(result.total_nodes, 3);
        assert_eq!(result.processed_nodes, 3);
        assert_eq!(result.passed_nodes, 3);
        assert!((result.pass_rate - 1.0).abs() < f64::EPSILON);
        assert!(result.checkpoint_path.exists());
        assert!(orch.graph().node(&id("b")).unwrap().implementation.is_some());

        let saved = CheckpointManager::new(&result.checkpoint_path, 2).read_checkpoint().unwrap();
        assert_eq!(saved.status_of(&id("c")), NodeStatus::Passed);
        let artifacts =
            crate::infrastructure::fs::load_graph(&dir.path().join("cp.graph.json")).unwrap();
        assert!(artifacts.node(&id("a")).unwrap().implementation.is_some());
    }

    #[tokio::test]
    async fn test_context_contains_generated_ancestors() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, MockSandbox::passing(), OrchestratorConfig::default());
        orch.run().await.unwrap();

        let full_order = orch.scheduler().compute_order().unwrap();
        let positions = full_order.into_iter().enumerate().map(|(i, id)| (id, i)).collect();
        let context = orch.build_context(&id("b"), &positions);
        assert_eq!(context.dependencies.len(), 1);
        assert_eq!(context.dependencies[0].node_id, id("a"));
        assert_eq!(context.dependencies[0].signature.as_deref(), Some("def load(path)"));
        assert!(orch.build_context(&id("c"), &positions).is_empty());
    }

    #[tokio::test]
    async fn test_failure_skips_dependents() {
        let dir = TempDir::new().unwrap();
        let sandbox = MockSandbox::passing().with_failing_nodes(["a"]);
        let mut orch = orchestrator(&dir, sandbox, OrchestratorConfig::default());

        let result = orch.run().await.unwrap();

        assert_eq!(result.failed_nodes, 1);
        assert_eq!(result.skipped_nodes, 1);
        assert_eq!(result.passed_nodes, 1);
        assert_eq!(result.processed_nodes, 2);
        let b = result.node_outcomes.iter().find(|o| o.node_id == id("b")).unwrap();
        assert_eq!(b.status, NodeStatus::Skipped);
        assert!(!b.processed);
        assert_eq!(orch.state().retry_count_of(&id("a")), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_and_saves() {
        let dir = TempDir::new().unwrap();
        let sandbox = MockSandbox::passing().with_failing_nodes(["a"]);
        let config = OrchestratorConfig {
            fail_fast: true,
            ..OrchestratorConfig::default()
        };
        let mut orch = orchestrator(&dir, sandbox, config);

        let result = orch.run().await.unwrap();

        assert!(result.aborted);
        assert_eq!(result.processed_nodes, 1);
        let saved = CheckpointManager::new(&result.checkpoint_path, 2).read_checkpoint().unwrap();
        assert_eq!(saved.status_of(&id("a")), NodeStatus::Failed);
        assert_eq!(saved.status_of(&id("c")), NodeStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_processes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, MockSandbox::passing(), OrchestratorConfig::default());
        orch.cancellation_token().cancel();

        let result = orch.run().await.unwrap();

        assert!(result.interrupted);
        assert_eq!(result.processed_nodes, 0);
        assert!(result.checkpoint_path.exists());
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut orch =
            orchestrator(&dir, MockSandbox::passing(), OrchestratorConfig::default()).with_events(tx);
        orch.run().await.unwrap();
        drop(orch);

        let mut started = 0;
        let mut finished = 0;
        let mut completed = false;
        while let Some(event) = rx.recv().await {
            match event {
                OrchestratorEvent::Started { total } => assert_eq!(total, 3),
                OrchestratorEvent::NodeStarted { .. } => started += 1,
                OrchestratorEvent::NodeFinished { .. } => finished += 1,
                OrchestratorEvent::Completed { .. } => completed = true,
                _ => {}
            }
        }
        assert_eq!(started, 3);
        assert_eq!(finished, 3);
        assert!(completed);
    }

    #[tokio::test]
    async fn test_start_from_requires_passed_ancestors() {
        let dir = TempDir::new().unwrap();
        let config = OrchestratorConfig {
            start_from: Some(id("b")),
            ..OrchestratorConfig::default()
        };
        let mut orch = orchestrator(&dir, MockSandbox::passing(), config);

        let err = orch.run().await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }
}
