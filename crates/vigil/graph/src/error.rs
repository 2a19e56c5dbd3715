use crate::graph::{EdgeKind, NodeIndex};

/// Errors from investigation graph operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeIndex),
    #[error("self-loop rejected on {0}")]
    SelfLoop(NodeIndex),
    #[error("edge {from} -[{kind}]-> {to} would close a cycle")]
    WouldCreateCycle {
        from: NodeIndex,
        to: NodeIndex,
        kind: EdgeKind,
    },
    #[error("duplicate edge {from} -[{kind}]-> {to}")]
    DuplicateEdge {
        from: NodeIndex,
        to: NodeIndex,
        kind: EdgeKind,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
