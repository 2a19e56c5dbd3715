//! Live investigation session
//!
//! A session is owned by exactly one driver at a time. Every state change
//! goes through [`Session::transition`], which refuses moves the lifecycle
//! does not allow, and every reasoning step leaves a node in the graph.

use crate::budget::BudgetTracker;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::execution::{ExecutionRecord, RollbackAttempt};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;
use vigil_context::{ContextPacket, ContextScope};
use vigil_graph::{EdgeKind, InvestigationGraph, NodeIndex, NodeKind};
use vigil_reasoning::{EvidencePlanner, Scoring};
use vigil_safety::ApprovalToken;
use vigil_types::{
    ActionKind, BudgetLimit, ClarificationRequest, Evidence, EvidenceId, Hypothesis, HypothesisId,
    IntentClassification, IntentType, InvestigationId, InvestigationState, Recommendation,
    RecommendationId, ResourceRef, TransitionRecord,
};

/// Approval waiting to be acted on by the driver
#[derive(Debug, Clone)]
pub struct ApprovedAction {
    pub recommendation: RecommendationId,
    pub token: ApprovalToken,
    pub autonomous: bool,
}

#[derive(Debug)]
pub struct Session {
    pub id: InvestigationId,
    pub query: String,
    pub scope: ContextScope,
    pub intent: Option<IntentClassification>,
    pub clarification: Option<ClarificationRequest>,
    pub state: InvestigationState,
    pub transitions: Vec<TransitionRecord>,
    pub packet: Option<ContextPacket>,
    pub hypotheses: Vec<Hypothesis>,
    pub evidence: Vec<Evidence>,
    pub graph: InvestigationGraph,
    pub budget: BudgetTracker,
    pub planner: EvidencePlanner,
    pub scoring: Option<Scoring>,
    pub recommendations: Vec<Recommendation>,
    /// When each recommendation started waiting for a decision
    pub issued_at: HashMap<RecommendationId, DateTime<Utc>>,
    /// Rejected or failed actions that synthesis must not propose again
    pub exclusions: Vec<(ActionKind, ResourceRef)>,
    pub approved: Option<ApprovedAction>,
    pub executions: Vec<ExecutionRecord>,
    pub rollbacks: Vec<RollbackAttempt>,
    pub tool_backend_available: bool,
    pub action_backend_available: bool,
    pub budget_stop: Option<BudgetLimit>,
    pub failure: Option<String>,
    /// Observe level: nothing beyond the audit record is reported
    pub audit_only: bool,
    pub consecutive_tool_failures: u32,
    /// Tool calls to make before a decisive leader may stop the search
    pub evidence_floor: u32,
    /// Audit entry of the last execution, linked from its rollback
    pub last_execution_audit: Option<Uuid>,
    pub incident_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    trigger: NodeIndex,
    hypothesis_nodes: HashMap<HypothesisId, NodeIndex>,
    conclusion: Option<NodeIndex>,
    recommendation_nodes: HashMap<RecommendationId, NodeIndex>,
    action_nodes: HashMap<RecommendationId, NodeIndex>,
}

impl Session {
    pub fn new(
        id: InvestigationId,
        query: impl Into<String>,
        scope: ContextScope,
        incident_start: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Self {
        let query = query.into();
        let mut graph = InvestigationGraph::new();
        let trigger = graph.add_node(
            NodeKind::Trigger,
            query.clone(),
            json!({ "scope": scope, "incident_start": incident_start }),
        );
        Self {
            id,
            query,
            scope,
            intent: None,
            clarification: None,
            state: InvestigationState::Created,
            transitions: Vec::new(),
            packet: None,
            hypotheses: Vec::new(),
            evidence: Vec::new(),
            graph,
            budget: BudgetTracker::new(config.budgets.clone()),
            planner: EvidencePlanner::new(config.reasoning.clone()),
            scoring: None,
            recommendations: Vec::new(),
            issued_at: HashMap::new(),
            exclusions: Vec::new(),
            approved: None,
            executions: Vec::new(),
            rollbacks: Vec::new(),
            tool_backend_available: true,
            action_backend_available: true,
            budget_stop: None,
            failure: None,
            audit_only: false,
            consecutive_tool_failures: 0,
            evidence_floor: 0,
            last_execution_audit: None,
            incident_start,
            created_at: Utc::now(),
            completed_at: None,
            trigger,
            hypothesis_nodes: HashMap::new(),
            conclusion: None,
            recommendation_nodes: HashMap::new(),
            action_nodes: HashMap::new(),
        }
    }

    /// Move to `to`, recording why
    pub fn transition(
        &mut self,
        to: InvestigationState,
        reason: impl Into<String>,
    ) -> EngineResult<TransitionRecord> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(EngineError::IllegalTransition { from, to });
        }
        let record = TransitionRecord {
            from,
            to,
            reason: reason.into(),
            at: Utc::now(),
        };
        info!(investigation_id = %self.id, from = %from, to = %to, reason = %record.reason, "state transition");
        self.state = to;
        if to.is_terminal() {
            self.completed_at = Some(record.at);
            self.budget.pause();
        }
        self.transitions.push(record.clone());
        Ok(record)
    }

    pub fn target(&self) -> Option<&ResourceRef> {
        self.scope.primary()
    }

    pub fn intent_type(&self) -> IntentType {
        self.intent
            .as_ref()
            .map(|c| c.intent)
            .unwrap_or(IntentType::Diagnosis)
    }

    pub fn recommendation(&self, id: RecommendationId) -> Option<&Recommendation> {
        self.recommendations.iter().find(|r| r.id == id)
    }

    pub fn recommendation_mut(&mut self, id: RecommendationId) -> Option<&mut Recommendation> {
        self.recommendations.iter_mut().find(|r| r.id == id)
    }

    pub fn next_evidence_id(&self) -> EvidenceId {
        EvidenceId(self.evidence.len() as u32 + 1)
    }

    // ========== Graph recording ==========

    pub fn record_context(&mut self, packet: ContextPacket) -> EngineResult<()> {
        for item in packet.items() {
            let fact = self.graph.add_node(
                NodeKind::Fact,
                format!("{}: {}", item.category, item.label),
                item.content.clone(),
            );
            self.graph.add_edge(self.trigger, fact, EdgeKind::LeadsTo)?;
        }
        self.packet = Some(packet);
        Ok(())
    }

    pub fn record_hypotheses(&mut self, hypotheses: Vec<Hypothesis>) -> EngineResult<()> {
        for h in &hypotheses {
            let node = self.graph.add_node(
                NodeKind::Hypothesis,
                format!("{} {}", h.id, h.description),
                json!({ "failure_mode": h.failure_mode, "prior": h.prior }),
            );
            self.graph.add_edge(self.trigger, node, EdgeKind::LeadsTo)?;
            self.hypothesis_nodes.insert(h.id, node);
        }
        self.hypotheses = hypotheses;
        Ok(())
    }

    /// Store an evidence item and link it to every hypothesis it moved
    pub fn record_evidence(&mut self, evidence: Evidence) -> EngineResult<()> {
        let node = self.graph.add_node(
            NodeKind::Evidence,
            format!("{} {}", evidence.id, evidence.finding),
            json!({ "tool": evidence.tool, "result": evidence.result }),
        );
        for contribution in &evidence.contributions {
            if contribution.weight == 0.0 {
                continue;
            }
            let Some(target) = self.hypothesis_nodes.get(&contribution.hypothesis).copied() else {
                continue;
            };
            let kind = if contribution.supports() {
                EdgeKind::Supports
            } else {
                EdgeKind::Refutes
            };
            self.graph
                .add_weighted_edge(node, target, kind, contribution.weight)?;
        }
        self.evidence.push(evidence);
        Ok(())
    }

    pub fn record_conclusion(&mut self, scoring: Scoring) -> EngineResult<()> {
        let node = self.graph.add_node(
            NodeKind::Conclusion,
            format!("{:?}", scoring.conclusion).to_lowercase(),
            json!({ "confirmed": scoring.confirmed, "next_steps": scoring.next_steps }),
        );
        for finding in scoring.findings.iter().filter(|f| f.hypothesis.is_none()) {
            let fact = self
                .graph
                .add_node(NodeKind::Finding, finding.summary.clone(), json!(finding.evidence));
            self.graph.add_edge(fact, node, EdgeKind::Supports)?;
        }
        for id in &scoring.confirmed {
            if let Some(h) = self.hypothesis_nodes.get(id).copied() {
                self.graph.add_edge(h, node, EdgeKind::LeadsTo)?;
            }
        }
        self.conclusion = Some(node);
        self.scoring = Some(scoring);
        Ok(())
    }

    pub fn record_recommendation(&mut self, rec: Recommendation) -> EngineResult<()> {
        let node = self.graph.add_node(
            NodeKind::Recommendation,
            rec.action.describe(),
            json!({ "risk_score": rec.risk_score, "disposition": rec.disposition }),
        );
        if let Some(conclusion) = self.conclusion {
            self.graph.add_edge(conclusion, node, EdgeKind::LeadsTo)?;
        }
        self.recommendation_nodes.insert(rec.id, node);
        self.issued_at.insert(rec.id, Utc::now());
        self.recommendations.push(rec);
        Ok(())
    }

    pub fn record_execution(&mut self, record: ExecutionRecord) -> EngineResult<()> {
        let node = self.graph.add_node(
            NodeKind::Action,
            record.action.describe(),
            json!({ "correlation": record.correlation, "applied": record.applied() }),
        );
        if let Some(rec) = self.recommendation_nodes.get(&record.recommendation).copied() {
            self.graph.add_edge(rec, node, EdgeKind::LeadsTo)?;
        }
        self.action_nodes.insert(record.recommendation, node);
        self.executions.push(record);
        Ok(())
    }

    pub fn record_rollback(&mut self, attempt: RollbackAttempt) -> EngineResult<()> {
        let node = self.graph.add_node(
            NodeKind::Rollback,
            format!("rollback of {}", attempt.original),
            json!({ "trigger": attempt.trigger, "outcome": attempt.outcome }),
        );
        if let Some(action) = self.action_nodes.get(&attempt.recommendation).copied() {
            self.graph.add_edge(action, node, EdgeKind::LeadsTo)?;
        }
        self.rollbacks.push(attempt);
        Ok(())
    }
}
