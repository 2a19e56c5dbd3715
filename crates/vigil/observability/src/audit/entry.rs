//! Audit entry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;
use vigil_types::InvestigationId;

/// An immutable, hash-chained audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,

    pub timestamp: DateTime<Utc>,

    /// Investigation the record belongs to; `None` for engine-wide events
    pub investigation: Option<InvestigationId>,

    pub actor: AuditActor,

    pub action: AuditAction,

    pub outcome: AuditOutcome,

    /// Additional structured details
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,

    /// Entry this one refers back to, e.g. a rollback to its execution
    pub related_entry: Option<Uuid>,

    /// Hash of the previous entry in the chain
    pub previous_hash: Option<String>,

    /// Hash of this entry
    pub entry_hash: String,
}

impl AuditEntry {
    pub fn builder() -> AuditEntryBuilder {
        AuditEntryBuilder::new()
    }
}

/// Builder for audit entries
#[derive(Debug, Default)]
pub struct AuditEntryBuilder {
    investigation: Option<InvestigationId>,
    actor: Option<AuditActor>,
    action: Option<AuditAction>,
    outcome: Option<AuditOutcome>,
    details: BTreeMap<String, serde_json::Value>,
    related_entry: Option<Uuid>,
}

impl AuditEntryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn investigation(mut self, id: InvestigationId) -> Self {
        self.investigation = Some(id);
        self
    }

    pub fn actor(mut self, actor: AuditActor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Add a detail value; values that fail to serialize are skipped
    pub fn detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    pub fn related_to(mut self, entry: Uuid) -> Self {
        self.related_entry = Some(entry);
        self
    }

    /// Build the entry without hashes; the sink chains it
    pub fn build(self) -> Result<PartialAuditEntry, &'static str> {
        Ok(PartialAuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            investigation: self.investigation,
            actor: self.actor.unwrap_or_else(|| AuditActor::system("engine")),
            action: self.action.ok_or("action is required")?,
            outcome: self.outcome.unwrap_or(AuditOutcome::Success),
            details: self.details,
            related_entry: self.related_entry,
        })
    }
}

/// Audit entry before it is placed in a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialAuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub investigation: Option<InvestigationId>,
    pub actor: AuditActor,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub details: BTreeMap<String, serde_json::Value>,
    pub related_entry: Option<Uuid>,
}

/// Fields covered by the entry hash, in a fixed order
#[derive(Serialize)]
struct HashInput<'a> {
    id: &'a Uuid,
    timestamp: String,
    investigation: &'a Option<InvestigationId>,
    actor: &'a AuditActor,
    action: &'a AuditAction,
    outcome: &'a AuditOutcome,
    details: &'a BTreeMap<String, serde_json::Value>,
    related_entry: &'a Option<Uuid>,
    previous_hash: Option<&'a str>,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_hash(
    id: &Uuid,
    timestamp: &DateTime<Utc>,
    investigation: &Option<InvestigationId>,
    actor: &AuditActor,
    action: &AuditAction,
    outcome: &AuditOutcome,
    details: &BTreeMap<String, serde_json::Value>,
    related_entry: &Option<Uuid>,
    previous_hash: Option<&str>,
) -> String {
    let input = HashInput {
        id,
        timestamp: timestamp.to_rfc3339(),
        investigation,
        actor,
        action,
        outcome,
        details,
        related_entry,
        previous_hash,
    };
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&input).unwrap_or_default());
    hex::encode(hasher.finalize())
}

impl PartialAuditEntry {
    /// Chain onto `previous_hash` and seal
    pub fn finalize(self, previous_hash: Option<String>) -> AuditEntry {
        let entry_hash = compute_hash(
            &self.id,
            &self.timestamp,
            &self.investigation,
            &self.actor,
            &self.action,
            &self.outcome,
            &self.details,
            &self.related_entry,
            previous_hash.as_deref(),
        );
        AuditEntry {
            id: self.id,
            timestamp: self.timestamp,
            investigation: self.investigation,
            actor: self.actor,
            action: self.action,
            outcome: self.outcome,
            details: self.details,
            related_entry: self.related_entry,
            previous_hash,
            entry_hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// A human operator
    User,
    /// The engine itself
    System,
    /// An external collaborator (tool backend, action backend)
    Service,
}

/// Who caused the recorded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    pub actor_type: ActorType,
    pub id: String,
}

impl AuditActor {
    pub fn system(component: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::System,
            id: component.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::User,
            id: id.into(),
        }
    }

    pub fn service(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Service,
            id: id.into(),
        }
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditAction {
    InvestigationStarted,
    StateTransition { from: String, to: String },
    ClarificationRequested,
    HypothesesGenerated,
    ToolCalled { tool: String },
    RecommendationIssued,
    GuardrailBlocked,
    ApprovalGranted,
    ApprovalRejected,
    ApprovalExpired,
    ActionExecuted,
    RollbackExecuted,
    PolicyUpdated,
    InvestigationArchived,
}

impl AuditAction {
    pub fn name(&self) -> &'static str {
        match self {
            AuditAction::InvestigationStarted => "investigation_started",
            AuditAction::StateTransition { .. } => "state_transition",
            AuditAction::ClarificationRequested => "clarification_requested",
            AuditAction::HypothesesGenerated => "hypotheses_generated",
            AuditAction::ToolCalled { .. } => "tool_called",
            AuditAction::RecommendationIssued => "recommendation_issued",
            AuditAction::GuardrailBlocked => "guardrail_blocked",
            AuditAction::ApprovalGranted => "approval_granted",
            AuditAction::ApprovalRejected => "approval_rejected",
            AuditAction::ApprovalExpired => "approval_expired",
            AuditAction::ActionExecuted => "action_executed",
            AuditAction::RollbackExecuted => "rollback_executed",
            AuditAction::PolicyUpdated => "policy_updated",
            AuditAction::InvestigationArchived => "investigation_archived",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::StateTransition { from, to } => write!(f, "state_transition {from}->{to}"),
            AuditAction::ToolCalled { tool } => write!(f, "tool_called {tool}"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure { reason: String },
    Denied { reason: String },
    Partial { details: String },
}

impl AuditOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
