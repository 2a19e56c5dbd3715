#![deny(unsafe_code)]
//! # vigil-graph
//!
//! The Investigation Graph: an append-only DAG recording every trigger,
//! hypothesis, evidence item, finding, conclusion, recommendation and
//! action of one investigation.
//!
//! ## Architecture
//!
//! Nodes live in an arena addressed by [`NodeIndex`]; edges are stored in a
//! second arena with per-node outgoing and incoming adjacency lists. Before
//! an edge `a -> b` is committed the graph checks whether `a` is already
//! reachable from `b`; if so the edge is rejected and nothing changes.
//!
//! ```text
//! Trigger -leads_to-> Hypothesis <-supports/refutes- Evidence
//!                         |
//!                      leads_to
//!                         v
//!                    Conclusion -leads_to-> Recommendation -leads_to-> Action
//! ```
//!
//! [`GraphSnapshot`] is the serialized form handed to the audit sink, and
//! [`InvestigationGraph::fingerprint`] gives a stable digest for replay checks.

pub mod error;
pub mod graph;
pub mod snapshot;
pub mod traversal;

pub use error::{GraphError, GraphResult};
pub use graph::{Edge, EdgeIndex, EdgeKind, InvestigationGraph, Node, NodeIndex, NodeKind};
pub use snapshot::GraphSnapshot;
