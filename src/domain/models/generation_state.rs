//! Persisted per-node generation state.
//!
//! `GenerationState` is the single source of truth for what has happened so
//! far in a run. `CheckpointManager` persists it as one JSON document:
//!
//! ```json
//! {
//!   "node_states": {
//!     "<id>": {"status": "passed", "retry_count": 1, "failure_reason": null,
//!              "test_results": {"passed": 4, "failed": 0}, "timestamp": "..."}
//!   },
//!   "max_retries": 3,
//!   "checkpoint_path": ".rpg-forge/checkpoint.json"
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::graph::NodeId;

/// Lifecycle status of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    InProgress,
    Passed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn all() -> &'static [NodeStatus] {
        &[
            NodeStatus::Pending,
            NodeStatus::InProgress,
            NodeStatus::Passed,
            NodeStatus::Failed,
            NodeStatus::Skipped,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::InProgress => "in_progress",
            NodeStatus::Passed => "passed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pass/fail tallies from the most recent test execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTally {
    pub passed: u32,
    pub failed: u32,
}

/// State machine record for a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGenerationState {
    pub status: NodeStatus,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    pub test_results: TestTally,
    pub timestamp: DateTime<Utc>,
}

impl Default for NodeGenerationState {
    fn default() -> Self {
        Self {
            status: NodeStatus::Pending,
            retry_count: 0,
            failure_reason: None,
            test_results: TestTally::default(),
            timestamp: Utc::now(),
        }
    }
}

impl NodeGenerationState {
    fn touch(&mut self) {
        self.timestamp = Utc::now();
    }
}

/// Node counts grouped by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

impl StatusSummary {
    pub fn record(&mut self, status: NodeStatus) {
        match status {
            NodeStatus::Pending => self.pending += 1,
            NodeStatus::InProgress => self.in_progress += 1,
            NodeStatus::Passed => self.passed += 1,
            NodeStatus::Failed => self.failed += 1,
            NodeStatus::Skipped => self.skipped += 1,
        }
        self.total += 1;
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        match status {
            NodeStatus::Pending => self.pending,
            NodeStatus::InProgress => self.in_progress,
            NodeStatus::Passed => self.passed,
            NodeStatus::Failed => self.failed,
            NodeStatus::Skipped => self.skipped,
        }
    }
}

/// Aggregate generation state for every node touched so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationState {
    node_states: HashMap<NodeId, NodeGenerationState>,
    max_retries: u32,
    checkpoint_path: PathBuf,
}

impl GenerationState {
    pub fn new(max_retries: u32, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            node_states: HashMap::new(),
            max_retries,
            checkpoint_path: checkpoint_path.into(),
        }
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.max_retries = max_retries;
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    pub fn set_checkpoint_path(&mut self, path: impl Into<PathBuf>) {
        self.checkpoint_path = path.into();
    }

    pub fn len(&self) -> usize {
        self.node_states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_states.is_empty()
    }

    /// Iterate recorded states in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeGenerationState)> {
        self.node_states.iter()
    }

    /// Existing state for `node_id`, or a freshly vivified `pending` one.
    pub fn get_or_create(&mut self, node_id: &NodeId) -> &mut NodeGenerationState {
        self.node_states.entry(node_id.clone()).or_default()
    }

    /// Read-only lookup that never vivifies.
    pub fn get(&self, node_id: &NodeId) -> Option<&NodeGenerationState> {
        self.node_states.get(node_id)
    }

    /// Status of `node_id`; unseen nodes read as `pending`.
    pub fn status_of(&self, node_id: &NodeId) -> NodeStatus {
        self.get(node_id).map_or(NodeStatus::Pending, |s| s.status)
    }

    /// Retry count of `node_id`; unseen nodes read as 0.
    pub fn retry_count_of(&self, node_id: &NodeId) -> u32 {
        self.get(node_id).map_or(0, |s| s.retry_count)
    }

    /// Set the status. A given reason replaces the stored one; `passed`
    /// clears any previous reason.
    pub fn set_status(&mut self, node_id: &NodeId, status: NodeStatus, failure_reason: Option<String>) {
        let state = self.get_or_create(node_id);
        state.status = status;
        if failure_reason.is_some() {
            state.failure_reason = failure_reason;
        } else if status == NodeStatus::Passed {
            state.failure_reason = None;
        }
        state.touch();
    }

    /// Increment the retry counter and return the new value.
    pub fn increment_retry(&mut self, node_id: &NodeId) -> u32 {
        let state = self.get_or_create(node_id);
        state.retry_count += 1;
        state.touch();
        state.retry_count
    }

    pub fn update_test_results(&mut self, node_id: &NodeId, passed: u32, failed: u32) {
        let state = self.get_or_create(node_id);
        state.test_results = TestTally { passed, failed };
        state.touch();
    }

    /// Back to `pending` with retry 0, no reason and zeroed tallies.
    pub fn reset(&mut self, node_id: &NodeId) {
        let state = self.get_or_create(node_id);
        state.status = NodeStatus::Pending;
        state.retry_count = 0;
        state.failure_reason = None;
        state.test_results = TestTally::default();
        state.touch();
    }

    /// True iff the node is `passed` or `skipped`.
    pub fn is_complete(&self, node_id: &NodeId) -> bool {
        matches!(self.status_of(node_id), NodeStatus::Passed | NodeStatus::Skipped)
    }

    pub fn is_failed(&self, node_id: &NodeId) -> bool {
        self.status_of(node_id) == NodeStatus::Failed
    }

    /// Counts of recorded nodes grouped by status.
    pub fn summary(&self) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for state in self.node_states.values() {
            summary.record(state.status);
        }
        summary
    }

    /// Recorded nodes currently in `status`, sorted by id.
    pub fn node_ids_with_status(&self, status: NodeStatus) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .node_states
            .iter()
            .filter(|(_, s)| s.status == status)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Passed nodes over recorded nodes; 0.0 when nothing is recorded.
    #[allow(clippy::cast_precision_loss)]
    pub fn pass_rate(&self) -> f64 {
        let summary = self.summary();
        if summary.total == 0 {
            return 0.0;
        }
        summary.passed as f64 / summary.total as f64
    }
}
