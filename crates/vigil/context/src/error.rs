//! Context errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    #[error("context source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid context configuration: {0}")]
    InvalidConfig(String),
}

pub type ContextResult<T> = Result<T, ContextError>;
