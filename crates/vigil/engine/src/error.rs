//! Error types for the investigation engine

use crate::backend::BackendError;
use crate::tools::ToolError;
use thiserror::Error;
use vigil_types::{InvestigationId, InvestigationState, RecommendationId};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to render configuration: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Safety error: {0}")]
    Safety(#[from] vigil_safety::SafetyError),

    #[error("Reasoning error: {0}")]
    Reasoning(#[from] vigil_reasoning::ReasoningError),

    #[error("Context error: {0}")]
    Context(#[from] vigil_context::ContextError),

    #[error("Graph error: {0}")]
    Graph(#[from] vigil_graph::GraphError),

    #[error("Observability error: {0}")]
    Observability(#[from] vigil_observability::ObservabilityError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Action backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Investigation not found: {0}")]
    NotFound(InvestigationId),

    #[error("Recommendation {recommendation} not found in {investigation}")]
    RecommendationNotFound {
        investigation: InvestigationId,
        recommendation: RecommendationId,
    },

    /// Operation not accepted in the investigation's current state
    #[error("{operation} not allowed for {id} in state {state}")]
    InvalidState {
        id: InvestigationId,
        state: InvestigationState,
        operation: &'static str,
    },

    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition {
        from: InvestigationState,
        to: InvestigationState,
    },

    #[error("Recommendation {0} cannot be approved: {1}")]
    NotApprovable(RecommendationId, String),

    #[error("Approval for {0} expired")]
    ApprovalExpired(RecommendationId),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn invalid_state(
        id: InvestigationId,
        state: InvestigationState,
        operation: &'static str,
    ) -> Self {
        Self::InvalidState {
            id,
            state,
            operation,
        }
    }
}
