//! Deterministic traversal and failure propagation over the plan graph.
//!
//! Only hierarchy and data-flow edges constrain order. Nodes are layered
//! (1 + max layer of their dependencies, 0 for roots) and sorted by
//! `(layer, id)`, so the order never depends on map iteration or on which
//! ready node Kahn's algorithm happens to pop first. Checkpoint resume relies
//! on this: a restarted process must see the same order for unfinished work.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EdgeType, GenerationState, Graph, NodeId, NodeStatus, StatusSummary,
};

/// Status tally for one hierarchy root and everything below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentReport {
    pub root_id: NodeId,
    pub root_name: String,
    pub summary: StatusSummary,
}

/// Aggregate and per-component generation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub total_nodes: usize,
    pub passed_nodes: usize,
    pub failed_nodes: usize,
    pub skipped_nodes: usize,
    pub pending_nodes: usize,
    pub in_progress_nodes: usize,
    pub pass_rate: f64,
    pub components: Vec<ComponentReport>,
}

/// Immutable dependency index built from a [`Graph`].
///
/// The index captures the graph's shape once; generation only fills in
/// implementation slots, which never changes scheduling.
#[derive(Debug, Clone)]
pub struct Scheduler {
    node_ids: Vec<NodeId>,
    names: HashMap<NodeId, String>,
    leaves: HashSet<NodeId>,
    /// Dependency-edge successors (dependents), sorted.
    dependents: HashMap<NodeId, Vec<NodeId>>,
    /// Dependency-edge predecessors (dependencies), sorted.
    dependencies: HashMap<NodeId, Vec<NodeId>>,
    hierarchy_children: HashMap<NodeId, Vec<NodeId>>,
    hierarchy_roots: Vec<NodeId>,
    leaf_only: bool,
}

// Standalone helper for cycle extraction (no self needed)
fn detect_cycle_util(
    node: &NodeId,
    graph: &HashMap<NodeId, Vec<NodeId>>,
    visited: &mut HashSet<NodeId>,
    rec_stack: &mut HashSet<NodeId>,
    path: &mut Vec<NodeId>,
) -> bool {
    visited.insert(node.clone());
    rec_stack.insert(node.clone());
    path.push(node.clone());

    if let Some(neighbors) = graph.get(node) {
        for neighbor in neighbors {
            if !visited.contains(neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(neighbor) {
                if let Some(cycle_start) = path.iter().position(|id| id == neighbor) {
                    path.drain(0..cycle_start);
                    path.push(neighbor.clone());
                    return true;
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

impl Scheduler {
    pub fn new(graph: &Graph) -> Self {
        let node_ids = graph.node_ids();
        let mut dependents: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        let mut dependencies: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        let mut hierarchy_children: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        let mut has_hierarchy_parent: HashSet<NodeId> = HashSet::new();

        for edge in graph.edges() {
            let (source, target) = (edge.source_id(), edge.target_id());
            if edge.edge_type().is_dependency() {
                dependents.entry(source.clone()).or_default().insert(target.clone());
                dependencies.entry(target.clone()).or_default().insert(source.clone());
            }
            if edge.edge_type() == EdgeType::Hierarchy {
                hierarchy_children.entry(source.clone()).or_default().insert(target.clone());
                has_hierarchy_parent.insert(target.clone());
            }
        }

        let hierarchy_roots = node_ids
            .iter()
            .filter(|id| !has_hierarchy_parent.contains(*id))
            .cloned()
            .collect();

        let sorted = |m: HashMap<NodeId, BTreeSet<NodeId>>| {
            m.into_iter()
                .map(|(k, v)| (k, v.into_iter().collect::<Vec<_>>()))
                .collect::<HashMap<_, _>>()
        };

        Self {
            names: graph.nodes().map(|n| (n.id.clone(), n.name.clone())).collect(),
            leaves: graph
                .nodes()
                .filter(|n| n.is_generation_leaf())
                .map(|n| n.id.clone())
                .collect(),
            node_ids,
            dependents: sorted(dependents),
            dependencies: sorted(dependencies),
            hierarchy_children: sorted(hierarchy_children),
            hierarchy_roots,
            leaf_only: true,
        }
    }

    /// Schedule every node instead of only generation leaves.
    pub const fn with_leaf_only(mut self, leaf_only: bool) -> Self {
        self.leaf_only = leaf_only;
        self
    }

    pub const fn leaf_only(&self) -> bool {
        self.leaf_only
    }

    /// All node ids, sorted.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.names.contains_key(node_id)
    }

    pub fn is_leaf(&self, node_id: &NodeId) -> bool {
        self.leaves.contains(node_id)
    }

    pub fn name_of(&self, node_id: &NodeId) -> Option<&str> {
        self.names.get(node_id).map(String::as_str)
    }

    /// Direct hierarchy/data-flow predecessors of `node_id`, sorted.
    pub fn direct_dependencies(&self, node_id: &NodeId) -> &[NodeId] {
        self.dependencies.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Direct hierarchy/data-flow successors of `node_id`, sorted.
    pub fn direct_dependents(&self, node_id: &NodeId) -> &[NodeId] {
        self.dependents.get(node_id).map_or(&[], Vec::as_slice)
    }

    // ---------------------------------------------------------------------------
    // Ordering
    // ---------------------------------------------------------------------------

    /// Layer of every node, or a cycle error naming one offending cycle.
    pub fn compute_layers(&self) -> DomainResult<HashMap<NodeId, usize>> {
        let mut in_degree: HashMap<&NodeId, usize> = self
            .node_ids
            .iter()
            .map(|id| (id, self.direct_dependencies(id).len()))
            .collect();
        let mut layers: HashMap<NodeId, usize> = HashMap::with_capacity(self.node_ids.len());
        let mut queue: VecDeque<&NodeId> = self
            .node_ids
            .iter()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        for id in &queue {
            layers.insert((*id).clone(), 0);
        }

        while let Some(node_id) = queue.pop_front() {
            let layer = layers.get(node_id).copied().unwrap_or(0);
            for dependent in self.direct_dependents(node_id) {
                let entry = layers.entry(dependent.clone()).or_insert(0);
                *entry = (*entry).max(layer + 1);
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        let unresolved: Vec<&NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| *id)
            .collect();
        if !unresolved.is_empty() {
            return Err(DomainError::DependencyCycle(self.find_cycle(&unresolved)));
        }

        Ok(layers)
    }

    fn find_cycle(&self, unresolved: &[&NodeId]) -> Vec<NodeId> {
        let members: HashSet<&NodeId> = unresolved.iter().copied().collect();
        let graph: HashMap<NodeId, Vec<NodeId>> = unresolved
            .iter()
            .map(|id| {
                let next = self
                    .direct_dependents(id)
                    .iter()
                    .filter(|d| members.contains(d))
                    .cloned()
                    .collect();
                ((*id).clone(), next)
            })
            .collect();

        let mut starts: Vec<&NodeId> = unresolved.to_vec();
        starts.sort();

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();
        for start in starts {
            if !visited.contains(start)
                && detect_cycle_util(start, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return path;
            }
        }
        // Every unresolved node sits on or behind a cycle, so this is unreachable
        // in practice; report the unresolved set rather than nothing.
        let mut ids: Vec<NodeId> = unresolved.iter().map(|id| (*id).clone()).collect();
        ids.sort();
        ids
    }

    /// Every node in `(layer, id)` order.
    #[instrument(skip(self), fields(nodes = self.node_ids.len()))]
    pub fn compute_order(&self) -> DomainResult<Vec<NodeId>> {
        let layers = self.compute_layers()?;
        let mut order: Vec<(usize, &NodeId)> = self
            .node_ids
            .iter()
            .map(|id| (layers.get(id).copied().unwrap_or(0), id))
            .collect();
        order.sort();
        debug!(max_layer = order.last().map_or(0, |(l, _)| *l), "computed traversal order");
        Ok(order.into_iter().map(|(_, id)| id.clone()).collect())
    }

    /// [`compute_order`](Self::compute_order) filtered to generation leaves.
    pub fn compute_generation_order(&self) -> DomainResult<Vec<NodeId>> {
        Ok(self
            .compute_order()?
            .into_iter()
            .filter(|id| self.is_leaf(id))
            .collect())
    }

    /// The order the orchestrator walks: leaves only unless configured otherwise.
    pub fn scheduled_order(&self) -> DomainResult<Vec<NodeId>> {
        if self.leaf_only {
            self.compute_generation_order()
        } else {
            self.compute_order()
        }
    }

    /// Whether `node_id` is part of the scheduled order.
    pub fn is_scheduled(&self, node_id: &NodeId) -> bool {
        self.contains(node_id) && (!self.leaf_only || self.is_leaf(node_id))
    }

    // ---------------------------------------------------------------------------
    // Reachability
    // ---------------------------------------------------------------------------

    fn reachable<'a>(
        &'a self,
        start: &NodeId,
        next: impl Fn(&NodeId) -> &'a [NodeId],
    ) -> Vec<NodeId> {
        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        let mut stack: Vec<&NodeId> = next(start).iter().collect();
        while let Some(id) = stack.pop() {
            if id != start && seen.insert(id.clone()) {
                stack.extend(next(id).iter());
            }
        }
        seen.into_iter().collect()
    }

    /// Every node reachable from `node_id` along dependency edges, sorted.
    pub fn descendants(&self, node_id: &NodeId) -> Vec<NodeId> {
        self.reachable(node_id, |id| self.direct_dependents(id))
    }

    /// Every node `node_id` transitively depends on, sorted.
    pub fn ancestors(&self, node_id: &NodeId) -> Vec<NodeId> {
        self.reachable(node_id, |id| self.direct_dependencies(id))
    }

    // ---------------------------------------------------------------------------
    // State transitions
    // ---------------------------------------------------------------------------

    pub fn mark_passed(&self, state: &mut GenerationState, node_id: &NodeId) {
        state.set_status(node_id, NodeStatus::Passed, None);
        info!(node_id = %node_id, "node passed");
    }

    /// Record a failed attempt.
    ///
    /// Below the retry budget the node goes back to `pending` and nothing is
    /// skipped. Once the budget is spent the node is `failed` and every
    /// descendant that is not already `passed`, `failed` or `skipped` becomes
    /// `skipped`. Returns the newly skipped ids, sorted.
    pub fn mark_failed(
        &self,
        state: &mut GenerationState,
        node_id: &NodeId,
        reason: &str,
    ) -> Vec<NodeId> {
        let retries = state.increment_retry(node_id);
        if retries < state.max_retries() {
            state.set_status(node_id, NodeStatus::Pending, Some(reason.to_string()));
            debug!(node_id = %node_id, retries, max_retries = state.max_retries(), "node failed, will retry");
            return Vec::new();
        }

        state.set_status(node_id, NodeStatus::Failed, Some(reason.to_string()));
        warn!(node_id = %node_id, retries, reason, "node failed permanently");
        self.propagate_failure(state, node_id)
    }

    /// Skip every unfinished descendant of a node that has already been
    /// recorded as `failed`. Returns the newly skipped ids, sorted.
    pub fn propagate_failure(&self, state: &mut GenerationState, node_id: &NodeId) -> Vec<NodeId> {
        let mut skipped = Vec::new();
        for descendant in self.descendants(node_id) {
            match state.status_of(&descendant) {
                NodeStatus::Passed | NodeStatus::Failed | NodeStatus::Skipped => {}
                NodeStatus::Pending | NodeStatus::InProgress => {
                    state.set_status(
                        &descendant,
                        NodeStatus::Skipped,
                        Some(format!("skipped: upstream node {node_id} failed")),
                    );
                    skipped.push(descendant);
                }
            }
        }
        if !skipped.is_empty() {
            info!(node_id = %node_id, skipped = skipped.len(), "skipped dependents of failed node");
        }
        skipped
    }

    /// `pending` and `in_progress` nodes need work; `in_progress` means a
    /// previous run was interrupted mid-node.
    pub fn should_process(&self, state: &GenerationState, node_id: &NodeId) -> bool {
        matches!(
            state.status_of(node_id),
            NodeStatus::Pending | NodeStatus::InProgress
        )
    }

    // ---------------------------------------------------------------------------
    // Reporting
    // ---------------------------------------------------------------------------

    fn hierarchy_group(&self, root: &NodeId) -> Vec<NodeId> {
        let mut group = vec![root.clone()];
        group.extend(self.reachable(root, |id| {
            self.hierarchy_children.get(id).map_or(&[], Vec::as_slice)
        }));
        group
    }

    /// Aggregate counts over scheduled nodes plus one tally per hierarchy
    /// root that has scheduled nodes beneath it.
    #[allow(clippy::cast_precision_loss)]
    pub fn generate_report(&self, state: &GenerationState) -> GenerationReport {
        let mut total = StatusSummary::default();
        for id in self.node_ids.iter().filter(|id| self.is_scheduled(id)) {
            total.record(state.status_of(id));
        }

        let components = self
            .hierarchy_roots
            .iter()
            .filter_map(|root| {
                let mut summary = StatusSummary::default();
                for id in self.hierarchy_group(root) {
                    if self.is_scheduled(&id) {
                        summary.record(state.status_of(&id));
                    }
                }
                (summary.total > 0).then(|| ComponentReport {
                    root_id: root.clone(),
                    root_name: self.name_of(root).unwrap_or_default().to_string(),
                    summary,
                })
            })
            .collect();

        GenerationReport {
            total_nodes: total.total,
            passed_nodes: total.passed,
            failed_nodes: total.failed,
            skipped_nodes: total.skipped,
            pending_nodes: total.pending,
            in_progress_nodes: total.in_progress,
            pass_rate: if total.total == 0 {
                0.0
            } else {
                total.passed as f64 / total.total as f64
            },
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Edge, Node};

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    /// Module → Component → {F1, F2}, data flow F1 → F2.
    fn plan() -> Graph {
        let mut g = Graph::new();
        g.add_node(Node::module("module", "core")).unwrap();
        g.add_node(Node::component("component", "parser")).unwrap();
        g.add_node(Node::function("f1", "tokenize")).unwrap();
        g.add_node(Node::function("f2", "parse")).unwrap();
        g.add_edge(Edge::new("module", "component", EdgeType::Hierarchy).unwrap()).unwrap();
        g.add_edge(Edge::new("component", "f1", EdgeType::Hierarchy).unwrap()).unwrap();
        g.add_edge(Edge::new("component", "f2", EdgeType::Hierarchy).unwrap()).unwrap();
        g.add_edge(Edge::data_flow("f1", "f2", "tokens", "list", None).unwrap()).unwrap();
        g
    }

    #[test]
    fn test_compute_order_layers_then_ids() {
        let scheduler = Scheduler::new(&plan());
        let order = scheduler.compute_order().unwrap();
        assert_eq!(order, vec![id("module"), id("component"), id("f1"), id("f2")]);

        let layers = scheduler.compute_layers().unwrap();
        assert_eq!(layers[&id("f2")], 3);
    }

    #[test]
    fn test_ties_broken_by_id_not_insertion() {
        let mut a = Graph::new();
        for name in ["zeta", "alpha", "mid"] {
            a.add_node(Node::function(name, name)).unwrap();
        }
        let mut b = Graph::new();
        for name in ["mid", "zeta", "alpha"] {
            b.add_node(Node::function(name, name)).unwrap();
        }
        let order_a = Scheduler::new(&a).compute_order().unwrap();
        let order_b = Scheduler::new(&b).compute_order().unwrap();
        assert_eq!(order_a, vec![id("alpha"), id("mid"), id("zeta")]);
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn test_non_dependency_edges_do_not_constrain_order() {
        let mut g = Graph::new();
        g.add_node(Node::function("a", "a")).unwrap();
        g.add_node(Node::function("b", "b")).unwrap();
        // b invokes a and a invokes b: not a dependency cycle.
        g.add_edge(Edge::new("b", "a", EdgeType::Invocation).unwrap()).unwrap();
        g.add_edge(Edge::new("a", "b", EdgeType::Ordering).unwrap()).unwrap();
        let order = Scheduler::new(&g).compute_order().unwrap();
        assert_eq!(order, vec![id("a"), id("b")]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut g = Graph::new();
        for name in ["a", "b", "c"] {
            g.add_node(Node::function(name, name)).unwrap();
        }
        g.add_edge(Edge::new("a", "b", EdgeType::DataFlow).unwrap()).unwrap();
        g.add_edge(Edge::new("b", "c", EdgeType::DataFlow).unwrap()).unwrap();
        g.add_edge(Edge::new("c", "a", EdgeType::Hierarchy).unwrap()).unwrap();

        let err = Scheduler::new(&g).compute_order().unwrap_err();
        match err {
            DomainError::DependencyCycle(path) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_generation_order_filters_leaves() {
        let scheduler = Scheduler::new(&plan());
        assert_eq!(scheduler.compute_generation_order().unwrap(), vec![id("f1"), id("f2")]);
        assert_eq!(scheduler.clone().with_leaf_only(false).scheduled_order().unwrap().len(), 4);
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let scheduler = Scheduler::new(&plan());
        assert_eq!(
            scheduler.ancestors(&id("f2")),
            vec![id("component"), id("f1"), id("module")]
        );
        assert_eq!(
            scheduler.descendants(&id("component")),
            vec![id("f1"), id("f2")]
        );
        assert!(scheduler.descendants(&id("f2")).is_empty());
    }

    #[test]
    fn test_mark_failed_retries_then_fails() {
        let scheduler = Scheduler::new(&plan());
        let mut state = GenerationState::new(3, "cp.json");
        let f1 = id("f1");

        assert!(scheduler.mark_failed(&mut state, &f1, "tests failed").is_empty());
        assert_eq!(state.status_of(&f1), NodeStatus::Pending);
        assert!(scheduler.should_process(&state, &f1));

        assert!(scheduler.mark_failed(&mut state, &f1, "tests failed").is_empty());
        let skipped = scheduler.mark_failed(&mut state, &f1, "tests failed");

        assert_eq!(state.status_of(&f1), NodeStatus::Failed);
        assert_eq!(state.retry_count_of(&f1), 3);
        assert!(!scheduler.should_process(&state, &f1));
        assert_eq!(skipped, vec![id("f2")]);
        assert!(state.is_complete(&id("f2")));
        assert!(state
            .get(&id("f2"))
            .unwrap()
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("f1"));
    }

    #[test]
    fn test_skip_propagation_spares_finished_nodes() {
        let mut g = Graph::new();
        for name in ["a", "b", "c", "d"] {
            g.add_node(Node::function(name, name)).unwrap();
        }
        for target in ["b", "c", "d"] {
            g.add_edge(Edge::new("a", target, EdgeType::DataFlow).unwrap()).unwrap();
        }
        let scheduler = Scheduler::new(&g);
        let mut state = GenerationState::new(1, "cp.json");
        state.set_status(&id("b"), NodeStatus::Passed, None);
        state.set_status(&id("c"), NodeStatus::Failed, Some("own failure".into()));

        let skipped = scheduler.mark_failed(&mut state, &id("a"), "boom");
        assert_eq!(skipped, vec![id("d")]);
        assert_eq!(state.status_of(&id("b")), NodeStatus::Passed);
        assert_eq!(state.status_of(&id("c")), NodeStatus::Failed);
    }

    #[test]
    fn test_should_process_includes_in_progress() {
        let scheduler = Scheduler::new(&plan());
        let mut state = GenerationState::new(3, "cp.json");
        state.set_status(&id("f1"), NodeStatus::InProgress, None);
        assert!(scheduler.should_process(&state, &id("f1")));
        state.set_status(&id("f1"), NodeStatus::Skipped, None);
        assert!(!scheduler.should_process(&state, &id("f1")));
    }

    #[test]
    fn test_report_groups_by_hierarchy_root() {
        let mut g = plan();
        g.add_node(Node::module("other", "utils")).unwrap();
        g.add_node(Node::function("u1", "slugify")).unwrap();
        g.add_edge(Edge::new("other", "u1", EdgeType::Hierarchy).unwrap()).unwrap();
        let scheduler = Scheduler::new(&g);

        let mut state = GenerationState::new(1, "cp.json");
        scheduler.mark_passed(&mut state, &id("u1"));
        scheduler.mark_failed(&mut state, &id("f1"), "boom");

        let report = scheduler.generate_report(&state);
        assert_eq!(report.total_nodes, 3);
        assert_eq!(report.passed_nodes, 1);
        assert_eq!(report.failed_nodes, 1);
        assert_eq!(report.skipped_nodes, 1);
        assert_eq!(report.components.len(), 2);

        let core = report.components.iter().find(|c| c.root_name == "core").unwrap();
        assert_eq!(core.summary.failed, 1);
        assert_eq!(core.summary.skipped, 1);
        let utils = report.components.iter().find(|c| c.root_name == "utils").unwrap();
        assert_eq!(utils.summary.passed, 1);
    }
}
