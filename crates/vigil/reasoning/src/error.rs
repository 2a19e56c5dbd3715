//! Reasoning errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReasoningError {
    #[error("hypothesis generator failed: {0}")]
    Generator(String),

    #[error("intent classifier failed: {0}")]
    Classifier(String),

    #[error("no hypotheses generated: {0}")]
    NoHypotheses(String),

    #[error("invalid reasoning configuration: {0}")]
    InvalidConfig(String),
}

pub type ReasoningResult<T> = Result<T, ReasoningError>;
