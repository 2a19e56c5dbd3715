//! Arena-backed investigation graph

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Position of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Position of an edge in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeIndex(pub u32);

/// Entity type a node records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The triggering query or anomaly signal
    Trigger,
    /// A fact from the context packet
    Fact,
    Hypothesis,
    Evidence,
    Finding,
    Conclusion,
    Recommendation,
    Action,
    Rollback,
}

/// Typed relation between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Supports,
    Refutes,
    DerivedFrom,
    LeadsTo,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Supports => "supports",
            EdgeKind::Refutes => "refutes",
            EdgeKind::DerivedFrom => "derived_from",
            EdgeKind::LeadsTo => "leads_to",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Append-only DAG over investigation entities.
///
/// Nodes and edges are never removed. Every edge insertion runs a
/// reachability check first, so the graph is acyclic at all times and a
/// rejected edge leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct InvestigationGraph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) outgoing: Vec<Vec<EdgeIndex>>,
    pub(crate) incoming: Vec<Vec<EdgeIndex>>,
}

impl InvestigationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        kind: NodeKind,
        label: impl Into<String>,
        payload: serde_json::Value,
    ) -> NodeIndex {
        let index = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            label: label.into(),
            payload,
        });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        index
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) -> GraphResult<EdgeIndex> {
        self.insert_edge(Edge {
            from,
            to,
            kind,
            weight: None,
        })
    }

    pub fn add_weighted_edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        kind: EdgeKind,
        weight: f64,
    ) -> GraphResult<EdgeIndex> {
        self.insert_edge(Edge {
            from,
            to,
            kind,
            weight: Some(weight),
        })
    }

    pub(crate) fn insert_edge(&mut self, edge: Edge) -> GraphResult<EdgeIndex> {
        let Edge { from, to, kind, .. } = edge;
        self.check_node(from)?;
        self.check_node(to)?;
        if from == to {
            return Err(GraphError::SelfLoop(from));
        }
        if self.outgoing[from.slot()]
            .iter()
            .any(|e| self.edges[e.0 as usize].to == to && self.edges[e.0 as usize].kind == kind)
        {
            return Err(GraphError::DuplicateEdge { from, to, kind });
        }
        // from -> to closes a cycle exactly when `from` is already reachable from `to`.
        if self.reaches(to, from) {
            debug!(%from, %to, %kind, "rejected cycle-forming edge");
            return Err(GraphError::WouldCreateCycle { from, to, kind });
        }

        let index = EdgeIndex(self.edges.len() as u32);
        self.edges.push(edge);
        self.outgoing[from.slot()].push(index);
        self.incoming[to.slot()].push(index);
        Ok(index)
    }

    fn check_node(&self, index: NodeIndex) -> GraphResult<()> {
        if index.slot() < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::NodeNotFound(index))
        }
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.slot())
    }

    pub fn edge(&self, index: EdgeIndex) -> Option<&Edge> {
        self.edges.get(index.0 as usize)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeIndex(i as u32), n))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeIndex> {
        self.nodes()
            .filter(|(_, n)| n.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Direct successors with the connecting edge kind
    pub fn successors(&self, index: NodeIndex) -> Vec<(NodeIndex, EdgeKind)> {
        self.outgoing
            .get(index.slot())
            .map(|out| {
                out.iter()
                    .map(|e| {
                        let edge = &self.edges[e.0 as usize];
                        (edge.to, edge.kind)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct predecessors with the connecting edge kind
    pub fn predecessors(&self, index: NodeIndex) -> Vec<(NodeIndex, EdgeKind)> {
        self.incoming
            .get(index.slot())
            .map(|inc| {
                inc.iter()
                    .map(|e| {
                        let edge = &self.edges[e.0 as usize];
                        (edge.from, edge.kind)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
