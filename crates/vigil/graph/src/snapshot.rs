//! Serialization, restore and fingerprinting for the audit sink

use crate::error::{GraphError, GraphResult};
use crate::graph::{Edge, InvestigationGraph, Node};
use serde::{Deserialize, Serialize};

/// Flat, serializable form of an [`InvestigationGraph`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl InvestigationGraph {
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Rebuild a graph, re-checking every edge.
    ///
    /// A snapshot that was tampered into a cycle fails to restore.
    pub fn restore(snapshot: GraphSnapshot) -> GraphResult<Self> {
        let mut graph = InvestigationGraph::new();
        for node in snapshot.nodes {
            graph.add_node(node.kind, node.label, node.payload);
        }
        for edge in snapshot.edges {
            graph.insert_edge(edge)?;
        }
        Ok(graph)
    }

    /// BLAKE3 hex digest of the canonical JSON snapshot
    pub fn fingerprint(&self) -> GraphResult<String> {
        let bytes = serde_json::to_vec(&self.snapshot())
            .map_err(|e| GraphError::Serialization(e.to_string()))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, NodeIndex, NodeKind};
    use serde_json::json;

    fn sample() -> InvestigationGraph {
        let mut g = InvestigationGraph::new();
        let t = g.add_node(NodeKind::Trigger, "latency", json!({"query": "why slow"}));
        let h = g.add_node(NodeKind::Hypothesis, "cpu throttling", json!({"prior": 0.3}));
        let e = g.add_node(NodeKind::Evidence, "throttled 40%", json!({}));
        g.add_edge(t, h, EdgeKind::LeadsTo).unwrap();
        g.add_weighted_edge(e, h, EdgeKind::Supports, 0.12).unwrap();
        g
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let g = sample();
        let restored = InvestigationGraph::restore(g.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), g.snapshot());
        assert_eq!(restored.fingerprint().unwrap(), g.fingerprint().unwrap());
    }

    #[test]
    fn test_restore_rejects_cyclic_snapshot() {
        let mut snap = sample().snapshot();
        snap.edges.push(Edge {
            from: NodeIndex(1),
            to: NodeIndex(0),
            kind: EdgeKind::DerivedFrom,
            weight: None,
        });
        assert!(matches!(
            InvestigationGraph::restore(snap),
            Err(GraphError::WouldCreateCycle { .. })
        ));
    }

    #[test]
    fn test_fingerprint_changes_on_append() {
        let mut g = sample();
        let before = g.fingerprint().unwrap();
        g.add_node(NodeKind::Finding, "new", json!(null));
        assert_ne!(before, g.fingerprint().unwrap());
    }
}
