//! Observability errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("audit error: {0}")]
    Audit(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("tracing error: {0}")]
    Tracing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ObservabilityResult<T> = Result<T, ObservabilityError>;
