//! Action-execution interface to the mutation collaborator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_safety::ApprovalToken;
use vigil_types::{ActionKind, CorrelationId, ProposedAction, ResourceRef, RollbackSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_type: ActionKind,
    pub resource: ResourceRef,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub approval_token: Option<ApprovalToken>,
    pub rollback_snapshot: Option<RollbackSnapshot>,
    /// Retries of the same request carry the same id
    pub correlation: CorrelationId,
}

impl ActionRequest {
    pub fn action(&self) -> ProposedAction {
        ProposedAction {
            kind: self.action_type,
            target: self.resource.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Success,
    Failure,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub result: ActionResult,
    pub new_state: serde_json::Value,
    pub verification_status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BackendError {
    #[error("action backend unavailable: {0}")]
    Unavailable(String),

    /// Missing or invalid approval token; never retried
    #[error("action rejected: {0}")]
    Rejected(String),

    #[error("action timed out: {0}")]
    Timeout(String),

    #[error("action backend internal error: {0}")]
    Internal(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Rejected(_))
    }
}

/// The collaborator that actually mutates the managed system.
///
/// Implementations deduplicate `execute` by correlation id: a repeated
/// request returns the first response without applying anything again.
#[async_trait]
pub trait ActionBackend: Send + Sync {
    async fn execute(&self, request: &ActionRequest) -> Result<ActionResponse, BackendError>;

    /// Full current state of a resource, used as the rollback snapshot
    async fn current_state(&self, resource: &ResourceRef) -> Result<serde_json::Value, BackendError>;

    /// Check whether the post-condition of an executed action holds
    async fn verify(
        &self,
        resource: &ResourceRef,
        expected: &serde_json::Value,
    ) -> Result<VerificationStatus, BackendError>;

    async fn is_available(&self) -> bool {
        true
    }
}
