//! Execution, post-action verification and rollback
//!
//! Rollback is not a separate undo path: the captured snapshot is wrapped
//! in an `apply_snapshot` action and sent through [`Executor::execute`]
//! like any other action.

use crate::backend::{
    ActionBackend, ActionRequest, ActionResponse, ActionResult, BackendError, VerificationStatus,
};
use crate::config::ExecutionConfig;
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use vigil_safety::{ApprovalAuthority, ApprovalToken, SYSTEM_APPROVER};
use vigil_types::{ActionKind, CorrelationId, ProposedAction, RecommendationId, RollbackSnapshot};

/// Attempts per dispatch when the backend reports a retryable error
const DISPATCH_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub recommendation: RecommendationId,
    pub correlation: CorrelationId,
    pub action: ProposedAction,
    /// Full pre-action state
    pub snapshot: RollbackSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ActionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub autonomous: bool,
}

impl ExecutionRecord {
    /// Applied at least partially
    pub fn applied(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|r| r.result != ActionResult::Failure)
    }

    pub fn fully_applied(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|r| r.result == ActionResult::Success)
    }

    pub fn failure_reason(&self) -> String {
        match (&self.response, &self.error) {
            (_, Some(err)) => err.clone(),
            (Some(r), None) => r
                .message
                .clone()
                .unwrap_or_else(|| format!("backend reported {:?}", r.result).to_lowercase()),
            (None, None) => "no response from action backend".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Passed,
    Failed { reason: String },
    TimedOut,
}

impl VerificationOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, VerificationOutcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    Succeeded,
    Failed { reason: String },
}

/// One rollback try, kept on the investigation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackAttempt {
    pub recommendation: RecommendationId,
    /// Correlation id of the execution being reversed
    pub original: CorrelationId,
    pub snapshot: RollbackSnapshot,
    pub trigger: String,
    pub outcome: RollbackOutcome,
    pub attempted_at: DateTime<Utc>,
}

impl RollbackAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == RollbackOutcome::Succeeded
    }
}

/// Runs approved actions against the backend, at most once per correlation id
pub struct Executor {
    backend: Arc<dyn ActionBackend>,
    authority: ApprovalAuthority,
    config: ExecutionConfig,
    completed: DashMap<CorrelationId, ExecutionRecord>,
}

impl Executor {
    pub fn new(
        backend: Arc<dyn ActionBackend>,
        authority: ApprovalAuthority,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            backend,
            authority,
            config,
            completed: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ActionBackend> {
        &self.backend
    }

    pub fn authority(&self) -> &ApprovalAuthority {
        &self.authority
    }

    pub fn issue_token(
        &self,
        recommendation: RecommendationId,
        correlation: CorrelationId,
        approver: &str,
        now: DateTime<Utc>,
    ) -> ApprovalToken {
        self.authority.issue(recommendation, correlation, approver, now)
    }

    pub fn find(&self, correlation: &CorrelationId) -> Option<ExecutionRecord> {
        self.completed.get(correlation).map(|r| r.clone())
    }

    /// Capture the pre-state, then apply `action`.
    ///
    /// The token is verified first; a missing or invalid token is a hard
    /// rejection before anything reaches the backend. A repeated correlation
    /// id returns the earlier record.
    #[instrument(skip(self, action, token), fields(action = %action, correlation = %correlation))]
    pub async fn execute(
        &self,
        recommendation: RecommendationId,
        action: &ProposedAction,
        correlation: &CorrelationId,
        token: Option<&ApprovalToken>,
    ) -> EngineResult<ExecutionRecord> {
        if let Some(existing) = self.find(correlation) {
            info!("duplicate execution request, returning earlier result");
            return Ok(existing);
        }

        let now = Utc::now();
        if let Err(err) = self.authority.verify(token, &recommendation, correlation, now) {
            error!(error = %err, "execution refused: approval token invalid");
            return Err(EngineError::Safety(err));
        }

        let state = self.backend.current_state(&action.target).await?;
        let snapshot = RollbackSnapshot::new(action.target.clone(), state);
        let request = ActionRequest {
            action_type: action.kind,
            resource: action.target.clone(),
            parameters: action.parameters.clone(),
            approval_token: token.cloned(),
            rollback_snapshot: Some(snapshot.clone()),
            correlation: correlation.clone(),
        };

        let (response, error) = match self.dispatch(&request).await {
            Ok(response) => (Some(response), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let record = ExecutionRecord {
            recommendation,
            correlation: correlation.clone(),
            action: action.clone(),
            snapshot,
            response,
            error,
            executed_at: now,
            autonomous: token.is_some_and(ApprovalToken::is_autonomous),
        };
        if record.applied() {
            info!("action applied");
        } else {
            warn!(reason = %record.failure_reason(), "action failed");
        }
        self.completed.insert(correlation.clone(), record.clone());
        Ok(record)
    }

    async fn dispatch(&self, request: &ActionRequest) -> Result<ActionResponse, BackendError> {
        let mut attempt = 1;
        loop {
            match self.backend.execute(request).await {
                Err(err) if err.is_retryable() && attempt < DISPATCH_ATTEMPTS => {
                    debug!(attempt, error = %err, "retrying action with the same correlation id");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Poll for the post-condition within the verification window
    pub async fn verify(&self, record: &ExecutionRecord) -> VerificationOutcome {
        let Some(response) = record.response.as_ref().filter(|_| record.applied()) else {
            return VerificationOutcome::Failed {
                reason: record.failure_reason(),
            };
        };
        match response.verification_status {
            VerificationStatus::Passed => return VerificationOutcome::Passed,
            VerificationStatus::Failed => {
                return VerificationOutcome::Failed {
                    reason: "backend reported the post-condition failed".into(),
                }
            }
            VerificationStatus::Pending => {}
        }

        let deadline = Instant::now() + self.config.verification_window();
        loop {
            match self
                .backend
                .verify(&record.action.target, &response.new_state)
                .await
            {
                Ok(VerificationStatus::Passed) => return VerificationOutcome::Passed,
                Ok(VerificationStatus::Failed) => {
                    return VerificationOutcome::Failed {
                        reason: format!("post-condition of {} not met", record.action),
                    }
                }
                Ok(VerificationStatus::Pending) => {}
                Err(err) if err.is_retryable() => {
                    debug!(error = %err, "verification poll failed, will retry");
                }
                Err(err) => {
                    return VerificationOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            }
            if Instant::now() + self.config.verification_poll() > deadline {
                warn!(action = %record.action, "verification window elapsed");
                return VerificationOutcome::TimedOut;
            }
            tokio::time::sleep(self.config.verification_poll()).await;
        }
    }

    /// Replay the pre-action snapshot of `record`
    pub async fn rollback(&self, record: &ExecutionRecord, trigger: &str) -> RollbackAttempt {
        let action = ProposedAction::new(ActionKind::ApplySnapshot, record.snapshot.resource.clone())
            .with_param("state", record.snapshot.state.clone());
        let correlation = CorrelationId::new(format!("{}/rollback", record.correlation.as_str()));
        let now = Utc::now();
        let token = self.issue_token(record.recommendation, correlation.clone(), SYSTEM_APPROVER, now);

        let outcome = match self
            .execute(record.recommendation, &action, &correlation, Some(&token))
            .await
        {
            Ok(applied) if applied.fully_applied() => RollbackOutcome::Succeeded,
            Ok(applied) => RollbackOutcome::Failed {
                reason: applied.failure_reason(),
            },
            Err(err) => RollbackOutcome::Failed {
                reason: err.to_string(),
            },
        };
        match &outcome {
            RollbackOutcome::Succeeded => info!(correlation = %record.correlation, "rollback applied"),
            RollbackOutcome::Failed { reason } => {
                error!(correlation = %record.correlation, %reason, "rollback failed")
            }
        }
        RollbackAttempt {
            recommendation: record.recommendation,
            original: record.correlation.clone(),
            snapshot: record.snapshot.clone(),
            trigger: trigger.to_string(),
            outcome,
            attempted_at: now,
        }
    }
}
