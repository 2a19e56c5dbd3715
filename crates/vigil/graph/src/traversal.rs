//! Reachability and ordering queries

use crate::graph::{InvestigationGraph, NodeIndex};
use std::collections::VecDeque;

impl InvestigationGraph {
    /// Whether `to` can be reached from `from` by following edges.
    ///
    /// Iterative DFS with a visited set; a node reaches itself.
    pub fn reaches(&self, from: NodeIndex, to: NodeIndex) -> bool {
        if from.slot() >= self.nodes.len() || to.slot() >= self.nodes.len() {
            return false;
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if std::mem::replace(&mut visited[current.slot()], true) {
                continue;
            }
            for edge in &self.outgoing[current.slot()] {
                let next = self.edges[edge.0 as usize].to;
                if !visited[next.slot()] {
                    stack.push(next);
                }
            }
        }
        false
    }

    /// Kahn ordering; ties resolved by insertion order.
    ///
    /// Always covers every node because the graph is acyclic.
    pub fn topological_order(&self) -> Vec<NodeIndex> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut ready: VecDeque<NodeIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| NodeIndex(i as u32))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_front() {
            order.push(node);
            for edge in &self.outgoing[node.slot()] {
                let next = self.edges[edge.0 as usize].to;
                in_degree[next.slot()] -= 1;
                if in_degree[next.slot()] == 0 {
                    ready.push_back(next);
                }
            }
        }
        order
    }

    /// Every node `index` was derived from, in topological order.
    ///
    /// This is the explanation chain behind a conclusion or recommendation.
    pub fn ancestors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        if index.slot() >= self.nodes.len() {
            return Vec::new();
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            for edge in &self.incoming[current.slot()] {
                let prev = self.edges[edge.0 as usize].from;
                if !std::mem::replace(&mut seen[prev.slot()], true) {
                    stack.push(prev);
                }
            }
        }
        self.topological_order()
            .into_iter()
            .filter(|n| seen[n.slot()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{EdgeKind, InvestigationGraph, NodeKind};
    use serde_json::Value;

    #[test]
    fn test_reaches() {
        let mut g = InvestigationGraph::new();
        let a = g.add_node(NodeKind::Trigger, "a", Value::Null);
        let b = g.add_node(NodeKind::Hypothesis, "b", Value::Null);
        let c = g.add_node(NodeKind::Evidence, "c", Value::Null);
        g.add_edge(a, b, EdgeKind::LeadsTo).unwrap();
        g.add_edge(b, c, EdgeKind::LeadsTo).unwrap();
        assert!(g.reaches(a, c));
        assert!(!g.reaches(c, a));
        assert!(g.reaches(b, b));
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let mut g = InvestigationGraph::new();
        let n: Vec<_> = (0..5)
            .map(|i| g.add_node(NodeKind::Fact, format!("{i}"), Value::Null))
            .collect();
        g.add_edge(n[4], n[0], EdgeKind::LeadsTo).unwrap();
        g.add_edge(n[0], n[2], EdgeKind::LeadsTo).unwrap();
        g.add_edge(n[3], n[2], EdgeKind::Supports).unwrap();
        let order = g.topological_order();
        assert_eq!(order.len(), 5);
        let pos = |x| order.iter().position(|o| *o == x).unwrap();
        for edge in g.edges() {
            assert!(pos(edge.from) < pos(edge.to));
        }
    }

    #[test]
    fn test_ancestors_is_explanation_chain() {
        let mut g = InvestigationGraph::new();
        let trigger = g.add_node(NodeKind::Trigger, "pods crashing", Value::Null);
        let h = g.add_node(NodeKind::Hypothesis, "oom", Value::Null);
        let e = g.add_node(NodeKind::Evidence, "OOMKilled", Value::Null);
        let unrelated = g.add_node(NodeKind::Hypothesis, "dns", Value::Null);
        let conclusion = g.add_node(NodeKind::Conclusion, "oom confirmed", Value::Null);
        g.add_edge(trigger, h, EdgeKind::LeadsTo).unwrap();
        g.add_edge(trigger, unrelated, EdgeKind::LeadsTo).unwrap();
        g.add_edge(e, h, EdgeKind::Supports).unwrap();
        g.add_edge(h, conclusion, EdgeKind::LeadsTo).unwrap();

        let chain = g.ancestors(conclusion);
        assert!(chain.contains(&trigger));
        assert!(chain.contains(&h));
        assert!(chain.contains(&e));
        assert!(!chain.contains(&unrelated));
        assert!(!chain.contains(&conclusion));
    }
}
