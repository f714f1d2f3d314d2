//! Repository planning graph domain models.
//!
//! A plan is a graph of module, component and feature nodes joined by typed
//! edges. Feature nodes with a function, class or method type are the
//! generation-eligible leaves; everything else only groups them for
//! reporting.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Stable identity of a plan node.
    NodeId
);
string_id!(
    /// Stable identity of a plan edge.
    EdgeId
);

/// Position of a node in the module → component → feature hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLevel {
    Module,
    Component,
    Feature,
}

/// What a node stands for in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Module,
    Component,
    Function,
    Class,
    Method,
}

impl NodeType {
    /// Whether nodes of this type need code generation.
    pub const fn is_generation_eligible(self) -> bool {
        matches!(self, Self::Function | Self::Class | Self::Method)
    }
}

/// A node of the planning graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub level: NodeLevel,
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    /// Generated implementation, populated once the node passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
    /// Generated tests, populated once the node passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_code: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        level: NodeLevel,
        node_type: NodeType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level,
            node_type,
            parent_id: None,
            folder_path: None,
            file_path: None,
            signature: None,
            docstring: None,
            implementation: None,
            test_code: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn module(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeLevel::Module, NodeType::Module)
    }

    pub fn component(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeLevel::Component, NodeType::Component)
    }

    pub fn function(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeLevel::Feature, NodeType::Function)
    }

    pub fn with_parent(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_folder_path(mut self, path: impl Into<String>) -> Self {
        self.folder_path = Some(path.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// True for nodes that go through the TDD loop.
    pub const fn is_generation_leaf(&self) -> bool {
        self.node_type.is_generation_eligible()
    }
}

/// Relationship carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Hierarchy,
    DataFlow,
    Invocation,
    Ordering,
    Inheritance,
}

impl EdgeType {
    /// Edge types that constrain generation order and failure propagation.
    pub const fn is_dependency(self) -> bool {
        matches!(self, Self::Hierarchy | Self::DataFlow)
    }
}

/// Unvalidated wire form of an [`Edge`].
#[derive(Debug, Clone, Deserialize)]
struct EdgeRecord {
    id: EdgeId,
    source_id: NodeId,
    target_id: NodeId,
    edge_type: EdgeType,
    #[serde(default)]
    data_name: Option<String>,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    transformation: Option<String>,
}

/// A directed, typed edge of the planning graph.
///
/// Edges can only be obtained through validating constructors (or
/// deserialization, which runs the same checks), so a self-loop never exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EdgeRecord")]
pub struct Edge {
    id: EdgeId,
    source_id: NodeId,
    target_id: NodeId,
    edge_type: EdgeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transformation: Option<String>,
}

impl TryFrom<EdgeRecord> for Edge {
    type Error = DomainError;

    fn try_from(record: EdgeRecord) -> Result<Self, Self::Error> {
        if record.source_id == record.target_id {
            return Err(DomainError::SelfLoop(record.source_id));
        }
        let has_payload = record.data_name.is_some()
            || record.data_type.is_some()
            || record.transformation.is_some();
        if has_payload && record.edge_type != EdgeType::DataFlow {
            return Err(DomainError::ValidationFailed(format!(
                "edge {} carries a data payload but is not a data_flow edge",
                record.id
            )));
        }
        Ok(Self {
            id: record.id,
            source_id: record.source_id,
            target_id: record.target_id,
            edge_type: record.edge_type,
            data_name: record.data_name,
            data_type: record.data_type,
            transformation: record.transformation,
        })
    }
}

impl Edge {
    /// Build an edge with a freshly generated id.
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        edge_type: EdgeType,
    ) -> DomainResult<Self> {
        Self::with_id(EdgeId::generate(), source, target, edge_type)
    }

    /// Build an edge with a caller-chosen id.
    pub fn with_id(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        edge_type: EdgeType,
    ) -> DomainResult<Self> {
        EdgeRecord {
            id: id.into(),
            source_id: source.into(),
            target_id: target.into(),
            edge_type,
            data_name: None,
            data_type: None,
            transformation: None,
        }
        .try_into()
    }

    /// Build a data-flow edge describing the value passed along it.
    pub fn data_flow(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        data_name: impl Into<String>,
        data_type: impl Into<String>,
        transformation: Option<String>,
    ) -> DomainResult<Self> {
        EdgeRecord {
            id: EdgeId::generate(),
            source_id: source.into(),
            target_id: target.into(),
            edge_type: EdgeType::DataFlow,
            data_name: Some(data_name.into()),
            data_type: Some(data_type.into()),
            transformation,
        }
        .try_into()
    }

    pub const fn id(&self) -> &EdgeId {
        &self.id
    }

    pub const fn source_id(&self) -> &NodeId {
        &self.source_id
    }

    pub const fn target_id(&self) -> &NodeId {
        &self.target_id
    }

    pub const fn edge_type(&self) -> EdgeType {
        self.edge_type
    }

    pub fn data_name(&self) -> Option<&str> {
        self.data_name.as_deref()
    }

    pub fn data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    pub fn transformation(&self) -> Option<&str> {
        self.transformation.as_deref()
    }

    /// Whether the edge touches `node_id` at either end.
    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.source_id == node_id || &self.target_id == node_id
    }
}

/// Serialized form of a [`Graph`]: `{metadata, nodes: [...], edges: [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphDocument {
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// The repository planning graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "GraphDocument", try_from = "GraphDocument")]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    /// Free-form plan metadata.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl From<Graph> for GraphDocument {
    fn from(graph: Graph) -> Self {
        let mut nodes: Vec<Node> = graph.nodes.into_values().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<Edge> = graph.edges.into_values().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            metadata: graph.metadata,
            nodes,
            edges,
        }
    }
}

impl TryFrom<GraphDocument> for Graph {
    type Error = DomainError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        let mut graph = Graph {
            metadata: doc.metadata,
            ..Graph::default()
        };
        for node in doc.nodes {
            graph.add_node(node)?;
        }
        for edge in doc.edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------------

    pub fn add_node(&mut self, node: Node) -> DomainResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(DomainError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node_id: &NodeId) -> DomainResult<Node> {
        let node = self
            .nodes
            .remove(node_id)
            .ok_or_else(|| DomainError::NodeNotFound(node_id.clone()))?;
        self.edges.retain(|_, edge| !edge.touches(node_id));
        Ok(node)
    }

    pub fn add_edge(&mut self, edge: Edge) -> DomainResult<()> {
        for endpoint in [edge.source_id(), edge.target_id()] {
            if !self.nodes.contains_key(endpoint) {
                return Err(DomainError::DanglingEdge {
                    edge: edge.id().clone(),
                    node: endpoint.clone(),
                });
            }
        }
        if self.edges.contains_key(edge.id()) {
            return Err(DomainError::ValidationFailed(format!(
                "edge {} already exists",
                edge.id()
            )));
        }
        self.edges.insert(edge.id().clone(), edge);
        Ok(())
    }

    pub fn remove_edge(&mut self, edge_id: &EdgeId) -> DomainResult<Edge> {
        self.edges
            .remove(edge_id)
            .ok_or_else(|| DomainError::EdgeNotFound(edge_id.clone()))
    }

    // ---------------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------------

    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    pub fn edge(&self, edge_id: &EdgeId) -> Option<&Edge> {
        self.edges.get(edge_id)
    }

    pub fn contains_node(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterate nodes in unspecified order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate edges in unspecified order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// All node ids, sorted.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Generation-eligible leaves, sorted by id.
    pub fn leaf_nodes(&self) -> Vec<&Node> {
        let mut leaves: Vec<&Node> = self.nodes.values().filter(|n| n.is_generation_leaf()).collect();
        leaves.sort_by(|a, b| a.id.cmp(&b.id));
        leaves
    }

    /// Edges with `node_id` at either end, sorted by edge id.
    pub fn edges_touching(&self, node_id: &NodeId) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.edges.values().filter(|e| e.touches(node_id)).collect();
        edges.sort_by(|a, b| a.id().cmp(b.id()));
        edges
    }

    /// Targets of outgoing edges accepted by `filter`, sorted and deduplicated.
    pub fn successors(&self, node_id: &NodeId, filter: impl Fn(EdgeType) -> bool) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .edges
            .values()
            .filter(|e| e.source_id() == node_id && filter(e.edge_type()))
            .map(|e| e.target_id().clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Sources of incoming edges accepted by `filter`, sorted and deduplicated.
    pub fn predecessors(&self, node_id: &NodeId, filter: impl Fn(EdgeType) -> bool) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .edges
            .values()
            .filter(|e| e.target_id() == node_id && filter(e.edge_type()))
            .map(|e| e.source_id().clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Direct hierarchy children.
    pub fn children(&self, node_id: &NodeId) -> Vec<NodeId> {
        self.successors(node_id, |t| t == EdgeType::Hierarchy)
    }

    /// Hierarchy parent, falling back to the node's declared `parent_id`.
    pub fn parent_of(&self, node_id: &NodeId) -> Option<NodeId> {
        self.predecessors(node_id, |t| t == EdgeType::Hierarchy)
            .into_iter()
            .next()
            .or_else(|| self.nodes.get(node_id).and_then(|n| n.parent_id.clone()))
    }

    // ---------------------------------------------------------------------------
    // Serialization
    // ---------------------------------------------------------------------------

    pub fn to_json(&self) -> DomainResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> DomainResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
