//! Investigation report

use crate::execution::RollbackAttempt;
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_reasoning::Conclusion;
use vigil_types::{
    ApprovalState, AutonomyLevel, BudgetLimit, BudgetUsage, ClarificationRequest, Disposition,
    Finding, Hypothesis, IntentType, InvestigationId, InvestigationState, RecommendationId,
    RecommendationTier, RiskBand, TransitionRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Root cause identified and a fix recommended or applied
    Resolved,
    /// Nothing above 0.50
    Inconclusive,
    /// Findings without anything actionable
    FindingsOnly,
    Failed,
    Cancelled,
    TimedOut,
    /// Still running, parked for approval or waiting for clarification
    Pending,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Resolved => "resolved",
            ReportStatus::Inconclusive => "inconclusive",
            ReportStatus::FindingsOnly => "findings-only",
            ReportStatus::Failed => "failed",
            ReportStatus::Cancelled => "cancelled",
            ReportStatus::TimedOut => "timed-out",
            ReportStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recommendation as a human reviews it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSummary {
    pub id: RecommendationId,
    pub action: String,
    pub tier: RecommendationTier,
    pub justification: String,
    pub expected_impact: String,
    pub risk_score: u8,
    pub risk_band: RiskBand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_level: Option<AutonomyLevel>,
    pub approval_state: ApprovalState,
    pub disposition: Disposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationReport {
    pub id: InvestigationId,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentType>,
    pub state: InvestigationState,
    pub status: ReportStatus,
    pub hypotheses: Vec<Hypothesis>,
    pub findings: Vec<Finding>,
    pub next_steps: Vec<String>,
    pub recommendations: Vec<RecommendationSummary>,
    pub budgets: BudgetUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_stop: Option<BudgetLimit>,
    pub rollbacks: Vec<RollbackAttempt>,
    pub tool_backend_available: bool,
    pub action_backend_available: bool,
    /// Findings and recommendations were withheld at Observe level
    #[serde(default)]
    pub audit_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub transitions: Vec<TransitionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl InvestigationReport {
    pub fn from_session(session: &Session) -> Self {
        let (findings, next_steps) = match &session.scoring {
            Some(s) if !session.audit_only => (s.findings.clone(), s.next_steps.clone()),
            _ => Default::default(),
        };
        let mut hypotheses = if session.audit_only {
            Vec::new()
        } else {
            session.hypotheses.clone()
        };
        hypotheses.sort_by(vigil_reasoning::scorer::compare);

        Self {
            id: session.id,
            query: session.query.clone(),
            intent: session.intent.as_ref().map(|c| c.intent),
            state: session.state,
            status: status_of(session),
            hypotheses,
            findings,
            next_steps,
            recommendations: session
                .recommendations
                .iter()
                .map(|r| RecommendationSummary {
                    id: r.id,
                    action: r.action.describe(),
                    tier: r.tier,
                    justification: r.justification.clone(),
                    expected_impact: r.expected_impact.clone(),
                    risk_score: r.risk_score,
                    risk_band: r.risk_band,
                    risk_explanation: r.risk_explanation.clone(),
                    required_level: r.required_level,
                    approval_state: r.approval_state,
                    disposition: r.disposition.clone(),
                    simulation: r.simulation.clone(),
                    status_note: r.status_note.clone(),
                })
                .collect(),
            budgets: session.budget.usage(),
            budget_stop: session.budget_stop,
            rollbacks: session.rollbacks.clone(),
            tool_backend_available: session.tool_backend_available,
            action_backend_available: session.action_backend_available,
            audit_only: session.audit_only,
            clarification: session.clarification.clone(),
            failure: session.failure.clone(),
            transitions: session.transitions.clone(),
            graph_fingerprint: session.graph.fingerprint().ok(),
            created_at: session.created_at,
            completed_at: session.completed_at,
        }
    }

    /// Findings carrying a hypothesis, best first
    pub fn primary_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.hypothesis.is_some())
    }

    pub fn pending_approvals(&self) -> impl Iterator<Item = &RecommendationSummary> {
        self.recommendations
            .iter()
            .filter(|r| r.approval_state == ApprovalState::Pending && r.disposition.is_actionable())
    }
}

fn status_of(session: &Session) -> ReportStatus {
    match session.state {
        InvestigationState::Failed => return ReportStatus::Failed,
        InvestigationState::Cancelled => return ReportStatus::Cancelled,
        InvestigationState::Timedout => return ReportStatus::TimedOut,
        InvestigationState::Completed => {}
        _ => return ReportStatus::Pending,
    }
    match session.scoring.as_ref().map(|s| s.conclusion) {
        None | Some(Conclusion::Inconclusive) => ReportStatus::Inconclusive,
        Some(Conclusion::Resolved) => {
            let actionable = session
                .recommendations
                .iter()
                .any(|r| r.disposition.is_actionable());
            if actionable && session.intent_type() != IntentType::Informational {
                ReportStatus::Resolved
            } else {
                ReportStatus::FindingsOnly
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use vigil_context::ContextScope;
    use vigil_reasoning::Scoring;
    use vigil_types::ResourceRef;

    fn session() -> Session {
        Session::new(
            InvestigationId::generate(),
            "why is api failing",
            ContextScope::resource(ResourceRef::namespaced("Deployment", "web", "api")),
            Utc::now(),
            &EngineConfig::default(),
        )
    }

    #[test]
    fn test_running_session_is_pending() {
        let s = session();
        let report = InvestigationReport::from_session(&s);
        assert_eq!(report.status, ReportStatus::Pending);
        assert!(report.graph_fingerprint.is_some());
    }

    #[test]
    fn test_inconclusive_completion() {
        let mut s = session();
        for to in [
            InvestigationState::Observing,
            InvestigationState::Hypothesizing,
            InvestigationState::Investigating,
            InvestigationState::Analyzing,
            InvestigationState::Concluding,
        ] {
            s.transition(to, "test").unwrap();
        }
        s.record_conclusion(Scoring {
            conclusion: Conclusion::Inconclusive,
            findings: Vec::new(),
            confirmed: Vec::new(),
            next_steps: vec!["run get_logs".into()],
        })
        .unwrap();
        s.transition(InvestigationState::Completed, "inconclusive").unwrap();

        let report = InvestigationReport::from_session(&s);
        assert_eq!(report.status, ReportStatus::Inconclusive);
        assert_eq!(report.next_steps, vec!["run get_logs".to_string()]);
        assert!(report.completed_at.is_some());
    }

    #[test]
    fn test_status_names() {
        assert_eq!(ReportStatus::FindingsOnly.to_string(), "findings-only");
        assert_eq!(ReportStatus::TimedOut.as_str(), "timed-out");
    }
}
