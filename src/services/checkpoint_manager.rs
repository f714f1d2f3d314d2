//! Resume-level operations over [`GenerationState`] and the plan graph.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GenerationState, Graph, NodeId, NodeStatus};
use crate::infrastructure::fs;
use crate::services::traversal::Scheduler;

/// Decides what still needs work and how a manual restart is performed.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    checkpoint_path: PathBuf,
    max_retries: u32,
}

impl CheckpointManager {
    pub fn new(checkpoint_path: impl Into<PathBuf>, max_retries: u32) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            max_retries,
        }
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Sidecar holding the graph with generated code, next to the checkpoint
    /// (`checkpoint.json` pairs with `checkpoint.graph.json`).
    pub fn artifacts_path(&self) -> PathBuf {
        self.checkpoint_path.with_extension("graph.json")
    }

    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint_path.is_file()
    }

    /// A fresh state bound to this manager's path and retry budget.
    pub fn fresh_state(&self) -> GenerationState {
        GenerationState::new(self.max_retries, &self.checkpoint_path)
    }

    /// Nodes still needing work, in traversal order.
    ///
    /// `pending`, `in_progress`, and `failed` nodes with retry budget left are
    /// included. `passed`, `skipped` and retry-exhausted `failed` nodes are not.
    pub fn get_nodes_to_process(
        &self,
        scheduler: &Scheduler,
        state: &GenerationState,
    ) -> DomainResult<Vec<NodeId>> {
        Ok(scheduler
            .scheduled_order()?
            .into_iter()
            .filter(|id| match state.status_of(id) {
                NodeStatus::Pending | NodeStatus::InProgress => true,
                NodeStatus::Failed => state.retry_count_of(id) < state.max_retries(),
                NodeStatus::Passed | NodeStatus::Skipped => false,
            })
            .collect())
    }

    /// Scheduled ancestors of `node_id` that are not `passed`, sorted. Empty
    /// means it is safe to start there. Ancestors outside the schedule (module
    /// and component nodes in leaf-only mode) never get a status and are not
    /// counted.
    pub fn validate_start_from(
        &self,
        scheduler: &Scheduler,
        state: &GenerationState,
        node_id: &NodeId,
    ) -> DomainResult<Vec<NodeId>> {
        if !scheduler.contains(node_id) {
            return Err(DomainError::NodeNotFound(node_id.clone()));
        }
        Ok(scheduler
            .ancestors(node_id)
            .into_iter()
            .filter(|id| scheduler.is_scheduled(id))
            .filter(|id| state.status_of(id) != NodeStatus::Passed)
            .collect())
    }

    /// Reset `node_id` and every descendant to `pending` with retry 0 and no
    /// failure reason. Fails without touching anything if an ancestor has not
    /// passed. Returns the reset ids, starting with `node_id`.
    pub fn resume_from_node(
        &self,
        scheduler: &Scheduler,
        state: &mut GenerationState,
        node_id: &NodeId,
    ) -> DomainResult<Vec<NodeId>> {
        let blocking = self.validate_start_from(scheduler, state, node_id)?;
        if !blocking.is_empty() {
            let ids: Vec<&str> = blocking.iter().map(NodeId::as_str).collect();
            return Err(DomainError::ValidationFailed(format!(
                "cannot resume from {node_id}: ancestors not passed: {}",
                ids.join(", ")
            )));
        }

        let mut reset = vec![node_id.clone()];
        reset.extend(scheduler.descendants(node_id));
        for id in &reset {
            state.reset(id);
        }
        info!(node_id = %node_id, reset = reset.len(), "reset subtree for regeneration");
        Ok(reset)
    }

    /// `passed`, `pending` and `skipped` nodes can be re-entered safely;
    /// `failed` and `in_progress` may have partial side effects outstanding.
    pub fn is_idempotent_safe(&self, state: &GenerationState, node_id: &NodeId) -> bool {
        matches!(
            state.status_of(node_id),
            NodeStatus::Passed | NodeStatus::Pending | NodeStatus::Skipped
        )
    }

    /// Write the state atomically (temp file, fsync, rename).
    pub fn save_checkpoint(&self, state: &GenerationState) -> DomainResult<()> {
        fs::write_json_atomic(&self.checkpoint_path, state)?;
        debug!(path = %self.checkpoint_path.display(), nodes = state.len(), "checkpoint saved");
        Ok(())
    }

    /// Read the checkpoint exactly as saved. A missing or malformed file is
    /// an error; there is no fallback to an empty state.
    pub fn read_checkpoint(&self) -> DomainResult<GenerationState> {
        fs::read_json_strict(&self.checkpoint_path)
    }

    /// Persist the graph, including generated code, to [`Self::artifacts_path`].
    pub fn save_artifacts(&self, graph: &Graph) -> DomainResult<()> {
        let path = self.artifacts_path();
        fs::write_json_atomic(&path, graph)?;
        debug!(path = %path.display(), "generated code saved");
        Ok(())
    }

    /// Copy saved code back into `graph` for nodes the state records as
    /// `passed` whose slots are still empty. Returns the restored ids, sorted.
    ///
    /// A missing sidecar restores nothing. A malformed one is an error.
    pub fn restore_artifacts(
        &self,
        graph: &mut Graph,
        state: &GenerationState,
    ) -> DomainResult<Vec<NodeId>> {
        let passed = state.node_ids_with_status(NodeStatus::Passed);
        if passed.is_empty() {
            return Ok(Vec::new());
        }

        let path = self.artifacts_path();
        let saved: Graph = match fs::read_json_strict(&path) {
            Ok(saved) => saved,
            Err(DomainError::CheckpointNotFound(_)) => {
                warn!(
                    path = %path.display(),
                    passed = passed.len(),
                    "no saved code for passed nodes; dependents get no upstream context"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut restored = Vec::new();
        for id in passed {
            let Some(source) = saved.node(&id) else {
                continue;
            };
            let Some(slot) = graph.node_mut(&id) else {
                continue;
            };
            if slot.implementation.is_some() || source.implementation.is_none() {
                continue;
            }
            slot.implementation.clone_from(&source.implementation);
            slot.test_code.clone_from(&source.test_code);
            restored.push(id);
        }
        info!(path = %path.display(), restored = restored.len(), "restored generated code");
        Ok(restored)
    }

    /// Load the checkpoint and bind it to `graph`.
    ///
    /// States for ids the graph no longer contains are kept but logged. The
    /// restored state takes this manager's path and retry budget.
    pub fn load_checkpoint(&self, graph: &Graph) -> DomainResult<GenerationState> {
        let mut state = self.read_checkpoint()?;

        let unknown: HashSet<&NodeId> = state
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !graph.contains_node(id))
            .collect();
        if !unknown.is_empty() {
            warn!(
                count = unknown.len(),
                path = %self.checkpoint_path.display(),
                "checkpoint references nodes missing from the graph"
            );
        }

        if state.max_retries() != self.max_retries {
            info!(
                checkpoint = state.max_retries(),
                configured = self.max_retries,
                "overriding checkpoint retry budget with configured value"
            );
            state.set_max_retries(self.max_retries);
        }
        state.set_checkpoint_path(&self.checkpoint_path);

        info!(path = %self.checkpoint_path.display(), nodes = state.len(), "checkpoint loaded");
        Ok(state)
    }

    /// Load the checkpoint when resuming, otherwise start fresh. Resuming
    /// without a readable checkpoint is an error.
    pub fn load_or_fresh(&self, graph: &Graph, resume: bool) -> DomainResult<GenerationState> {
        if resume {
            return self.load_checkpoint(graph);
        }
        if self.has_checkpoint() {
            info!(path = %self.checkpoint_path.display(), "existing checkpoint will be overwritten");
        }
        Ok(self.fresh_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Edge, EdgeType, Node};
    use tempfile::TempDir;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    /// a → b → c, a → d (data flow).
    fn chain() -> Graph {
        let mut g = Graph::new();
        for name in ["a", "b", "c", "d"] {
            g.add_node(Node::function(name, name)).unwrap();
        }
        g.add_edge(Edge::new("a", "b", EdgeType::DataFlow).unwrap()).unwrap();
        g.add_edge(Edge::new("b", "c", EdgeType::DataFlow).unwrap()).unwrap();
        g.add_edge(Edge::new("a", "d", EdgeType::DataFlow).unwrap()).unwrap();
        g
    }

    #[test]
    fn test_nodes_to_process_filters_finished_work() {
        let graph = chain();
        let scheduler = Scheduler::new(&graph);
        let manager = CheckpointManager::new("cp.json", 2);
        let mut state = manager.fresh_state();

        state.set_status(&id("a"), NodeStatus::Passed, None);
        state.set_status(&id("b"), NodeStatus::Failed, Some("gen error".into()));
        state.set_status(&id("c"), NodeStatus::Skipped, None);
        state.set_status(&id("d"), NodeStatus::InProgress, None);

        let todo = manager.get_nodes_to_process(&scheduler, &state).unwrap();
        assert_eq!(todo, vec![id("b"), id("d")]);

        state.increment_retry(&id("b"));
        state.increment_retry(&id("b"));
        let todo = manager.get_nodes_to_process(&scheduler, &state).unwrap();
        assert_eq!(todo, vec![id("d")]);
    }

    #[test]
    fn test_resume_rejects_unpassed_ancestors() {
        let graph = chain();
        let scheduler = Scheduler::new(&graph);
        let manager = CheckpointManager::new("cp.json", 2);
        let mut state = manager.fresh_state();
        state.set_status(&id("c"), NodeStatus::Failed, Some("boom".into()));

        let blocking = manager.validate_start_from(&scheduler, &state, &id("c")).unwrap();
        assert_eq!(blocking, vec![id("a"), id("b")]);

        let err = manager.resume_from_node(&scheduler, &mut state, &id("c")).unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
        assert_eq!(state.status_of(&id("c")), NodeStatus::Failed);
    }

    #[test]
    fn test_resume_resets_subtree() {
        let graph = chain();
        let scheduler = Scheduler::new(&graph);
        let manager = CheckpointManager::new("cp.json", 2);
        let mut state = manager.fresh_state();
        state.set_status(&id("a"), NodeStatus::Passed, None);
        state.increment_retry(&id("b"));
        state.increment_retry(&id("b"));
        state.set_status(&id("b"), NodeStatus::Failed, Some("exhausted 2 retries".into()));
        state.set_status(&id("c"), NodeStatus::Skipped, Some("upstream".into()));

        let reset = manager.resume_from_node(&scheduler, &mut state, &id("b")).unwrap();
        assert_eq!(reset, vec![id("b"), id("c")]);
        for node in &reset {
            let s = state.get(node).unwrap();
            assert_eq!(s.status, NodeStatus::Pending);
            assert_eq!(s.retry_count, 0);
            assert!(s.failure_reason.is_none());
        }
        assert_eq!(state.status_of(&id("a")), NodeStatus::Passed);
    }

    #[test]
    fn test_unscheduled_ancestors_do_not_block() {
        let mut graph = chain();
        graph.add_node(Node::component("comp", "comp")).unwrap();
        graph.add_edge(Edge::new("comp", "a", EdgeType::Hierarchy).unwrap()).unwrap();
        let manager = CheckpointManager::new("cp.json", 2);
        let mut state = manager.fresh_state();
        state.set_status(&id("a"), NodeStatus::Passed, None);

        let scheduler = Scheduler::new(&graph);
        assert!(manager.validate_start_from(&scheduler, &state, &id("b")).unwrap().is_empty());

        let all_nodes = Scheduler::new(&graph).with_leaf_only(false);
        let blocking = manager.validate_start_from(&all_nodes, &state, &id("b")).unwrap();
        assert_eq!(blocking, vec![id("comp")]);
    }

    #[test]
    fn test_unknown_start_node() {
        let graph = chain();
        let scheduler = Scheduler::new(&graph);
        let manager = CheckpointManager::new("cp.json", 2);
        let state = manager.fresh_state();
        let err = manager.validate_start_from(&scheduler, &state, &id("zzz")).unwrap_err();
        assert!(matches!(err, DomainError::NodeNotFound(_)));
    }

    #[test]
    fn test_idempotent_safety() {
        let manager = CheckpointManager::new("cp.json", 2);
        let mut state = manager.fresh_state();
        assert!(manager.is_idempotent_safe(&state, &id("x")));
        state.set_status(&id("x"), NodeStatus::InProgress, None);
        assert!(!manager.is_idempotent_safe(&state, &id("x")));
        state.set_status(&id("x"), NodeStatus::Failed, None);
        assert!(!manager.is_idempotent_safe(&state, &id("x")));
        state.set_status(&id("x"), NodeStatus::Skipped, None);
        assert!(manager.is_idempotent_safe(&state, &id("x")));
    }

    #[test]
    fn test_checkpoint_round_trip_and_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("cp.json");
        let graph = chain();

        let writer = CheckpointManager::new(&path, 2);
        let mut state = writer.fresh_state();
        state.set_status(&id("a"), NodeStatus::Passed, None);
        state.update_test_results(&id("a"), 3, 0);
        state.set_status(&id("ghost"), NodeStatus::Failed, Some("old node".into()));
        writer.save_checkpoint(&state).unwrap();
        assert!(writer.has_checkpoint());

        let reader = CheckpointManager::new(&path, 5);
        let loaded = reader.load_checkpoint(&graph).unwrap();
        assert_eq!(loaded.max_retries(), 5);
        assert_eq!(loaded.status_of(&id("a")), NodeStatus::Passed);
        assert_eq!(loaded.get(&id("a")).unwrap().test_results.passed, 3);
        assert!(loaded.get(&id("ghost")).is_some());
    }

    #[test]
    fn test_load_or_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cp.json");
        let graph = chain();
        let manager = CheckpointManager::new(&path, 3);

        assert!(manager.load_or_fresh(&graph, false).unwrap().is_empty());
        let err = manager.load_or_fresh(&graph, true).unwrap_err();
        assert!(matches!(err, DomainError::CheckpointNotFound(_)));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(manager.load_or_fresh(&graph, false).unwrap().is_empty());
        let err = manager.load_or_fresh(&graph, true).unwrap_err();
        assert!(matches!(err, DomainError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_read_checkpoint_is_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        let manager = CheckpointManager::new(&path, 4);

        let mut state = manager.fresh_state();
        state.set_status(&id("a"), NodeStatus::Passed, None);
        state.update_test_results(&id("a"), 5, 0);
        state.increment_retry(&id("b"));
        state.set_status(&id("b"), NodeStatus::Failed, Some("exhausted 1 retries".into()));

        manager.save_checkpoint(&state).unwrap();
        let loaded = manager.read_checkpoint().unwrap();
        assert_eq!(loaded, state);

        manager.save_checkpoint(&loaded).unwrap();
        let reloaded = manager.read_checkpoint().unwrap();
        assert_eq!(reloaded, state);
        assert_eq!(
            reloaded.get(&id("a")).unwrap().timestamp,
            state.get(&id("a")).unwrap().timestamp
        );
    }

    #[test]
    fn test_read_checkpoint_fails_loudly() {
        let dir = TempDir::new().unwrap();
        let missing = CheckpointManager::new(dir.path().join("missing.json"), 3);
        assert!(matches!(
            missing.read_checkpoint(),
            Err(DomainError::CheckpointNotFound(_))
        ));

        let corrupt_path = dir.path().join("corrupt.json");
        std::fs::write(&corrupt_path, r#"{"node_states": 7}"#).unwrap();
        let corrupt = CheckpointManager::new(&corrupt_path, 3);
        assert!(matches!(
            corrupt.read_checkpoint(),
            Err(DomainError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn test_artifacts_path_sits_next_to_checkpoint() {
        let manager = CheckpointManager::new("/tmp/run/checkpoint.json", 3);
        assert_eq!(
            manager.artifacts_path(),
            PathBuf::from("/tmp/run/checkpoint.graph.json")
        );
    }

    #[test]
    fn test_restore_artifacts_only_for_passed_nodes() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path().join("cp.json"), 3);

        let mut generated = chain();
        for name in ["a", "b"] {
            let node = generated.node_mut(&id(name)).unwrap();
            node.implementation = Some(format!("def {name}(): pass"));
            node.test_code = Some(format!("def test_{name}(): pass"));
        }
        manager.save_artifacts(&generated).unwrap();

        let mut state = manager.fresh_state();
        state.set_status(&id("a"), NodeStatus::Passed, None);
        state.set_status(&id("b"), NodeStatus::Pending, None);

        let mut plan = chain();
        let restored = manager.restore_artifacts(&mut plan, &state).unwrap();

        assert_eq!(restored, vec![id("a")]);
        let a = plan.node(&id("a")).unwrap();
        assert_eq!(a.implementation.as_deref(), Some("def a(): pass"));
        assert_eq!(a.test_code.as_deref(), Some("def test_a(): pass"));
        assert!(plan.node(&id("b")).unwrap().implementation.is_none());
    }

    #[test]
    fn test_restore_artifacts_without_sidecar() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path().join("cp.json"), 3);
        let mut state = manager.fresh_state();
        state.set_status(&id("a"), NodeStatus::Passed, None);

        let mut plan = chain();
        assert!(manager.restore_artifacts(&mut plan, &state).unwrap().is_empty());

        std::fs::write(manager.artifacts_path(), "{ not json").unwrap();
        let err = manager.restore_artifacts(&mut plan, &state).unwrap_err();
        assert!(matches!(err, DomainError::CheckpointCorrupt { .. }));
    }
}
