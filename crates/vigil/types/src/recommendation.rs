//! Proposed actions tied to confirmed hypotheses

use crate::action::ProposedAction;
use crate::autonomy::AutonomyLevel;
use crate::ids::{EvidenceId, HypothesisId, RecommendationId};
use crate::resource::ResourceRef;
use crate::risk::RiskBand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time horizon of a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationTier {
    Immediate,
    ShortTerm,
    LongTerm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// Pre-action state sufficient to reverse an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    pub resource: ResourceRef,
    pub state: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

impl RollbackSnapshot {
    pub fn new(resource: ResourceRef, state: serde_json::Value) -> Self {
        Self {
            resource,
            state,
            captured_at: Utc::now(),
        }
    }
}

/// What the safety gate decided for a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// Not yet evaluated
    Undecided,
    /// May execute without a human
    AutoExecute,
    /// Waits for a human decision
    AwaitApproval {
        explanation_required: bool,
        dry_run: bool,
    },
    /// Reported but never executed
    FindingOnly { reason: String },
    /// Written to the audit record only, never reported
    AuditOnly { reason: String },
    /// Hard guardrail or deny policy
    Blocked { reasons: Vec<String> },
}

impl Disposition {
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Disposition::AutoExecute | Disposition::AwaitApproval { .. }
        )
    }
}

/// A ranked, justified, reversible action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub hypothesis: HypothesisId,
    pub action: ProposedAction,
    pub justification: String,
    pub evidence_chain: Vec<EvidenceId>,
    pub expected_impact: String,
    pub tier: RecommendationTier,
    /// Each in [0, 1]
    pub urgency: f64,
    pub confidence: f64,
    pub impact: f64,
    /// urgency x confidence x impact
    pub composite: f64,
    pub risk_score: u8,
    pub risk_band: RiskBand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_explanation: Option<String>,
    pub rollback_plan: RollbackSnapshot,
    pub approval_state: ApprovalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_level: Option<AutonomyLevel>,
    pub disposition: Disposition,
    /// Dry-run projection shown before approval at Simulate level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_note: Option<String>,
}

impl Recommendation {
    pub fn is_pending(&self) -> bool {
        self.approval_state == ApprovalState::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_actionable() {
        assert!(Disposition::AutoExecute.is_actionable());
        assert!(Disposition::AwaitApproval {
            explanation_required: false,
            dry_run: true
        }
        .is_actionable());
        assert!(!Disposition::Blocked { reasons: vec![] }.is_actionable());
        assert!(!Disposition::AuditOnly { reason: "x".into() }.is_actionable());
        assert!(!Disposition::FindingOnly { reason: "x".into() }.is_actionable());
    }

    #[test]
    fn test_disposition_serde_tag() {
        let json = serde_json::to_value(Disposition::AutoExecute).unwrap();
        assert_eq!(json["disposition"], "auto_execute");
    }
}
