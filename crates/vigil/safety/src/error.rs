//! Safety layer errors

use thiserror::Error;

/// Errors raised by guardrail, policy and approval handling
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SafetyError {
    /// Risk weights must sum to 100
    #[error("risk weights sum to {0}, expected 100")]
    InvalidWeights(u32),

    /// A policy or guardrail setting could not be compiled
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Execution attempted without an approval token
    #[error("approval token missing")]
    MissingApproval,

    /// Token past its expiry
    #[error("approval token expired at {0}")]
    ApprovalExpired(chrono::DateTime<chrono::Utc>),

    /// Token issued for a different recommendation or correlation id
    #[error("approval token does not match: {0}")]
    ApprovalMismatch(String),

    /// Digest does not verify
    #[error("approval token signature invalid")]
    ApprovalForged,
}

/// Result type for safety operations
pub type SafetyResult<T> = Result<T, SafetyError>;
