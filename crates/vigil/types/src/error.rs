//! Error types for vigil-types

use thiserror::Error;

/// Failure to parse a textual representation of a core type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown autonomy level: {0}")]
    AutonomyLevel(String),

    #[error("unknown intent type: {0}")]
    IntentType(String),

    #[error("unknown action kind: {0}")]
    ActionKind(String),

    #[error("unknown action category: {0}")]
    ActionCategory(String),

    #[error("unknown failure mode: {0}")]
    FailureMode(String),

    #[error("unknown signal: {0}")]
    Signal(String),
}
