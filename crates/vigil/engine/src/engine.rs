//! Investigation engine
//!
//! The public face of the crate. It owns the session registry, the
//! concurrency limit and every collaborator, and exposes the operations a
//! caller performs on investigations: start and run them, answer
//! clarifications, approve or reject recommendations, ask for alternatives
//! or deeper evidence, and cancel.

use crate::builder::EngineBuilder;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventBus, InvestigationEvent};
use crate::execution::Executor;
use crate::registry::{InvestigationRecord, SessionHandle, SessionRegistry};
use crate::report::{InvestigationReport, RecommendationSummary};
use crate::scheduler::{ConcurrencySnapshot, Scheduler};
use crate::session::{ApprovedAction, Session};
use crate::tools::RetryingInvoker;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use vigil_context::{ApplyOutcome, ContextBuilder, ContextScope, ResourceCache};
use vigil_observability::{
    AuditAction, AuditActor, AuditEntry, AuditOutcome, AuditSink, VigilMetrics,
};
use vigil_reasoning::{
    BaseRateTable, ConfidenceScorer, HypothesisGenerator, IntentClassifier, LikelihoodTable,
    PlausibilityCheck, RecommendationSynthesizer,
};
use vigil_safety::{PolicySnapshot, SafetyConfig, SafetyGate};
use vigil_types::{
    ApprovalState, ChangeEvent, CorrelationId, HypothesisStatus, IntentClassification,
    IntentType, InvestigationId, InvestigationState, RecommendationId, ResourceRef,
};

/// What a caller asks the engine to investigate
#[derive(Debug, Clone, PartialEq)]
pub struct InvestigationRequest {
    pub query: String,
    pub scope: ContextScope,
    /// When the anomaly began; defaults to the time of the request
    pub incident_start: Option<DateTime<Utc>>,
    /// Skip classification when the caller already knows the intent
    pub intent: Option<IntentType>,
}

impl InvestigationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: ContextScope::default(),
            incident_start: None,
            intent: None,
        }
    }

    pub fn with_target(mut self, resource: ResourceRef) -> Self {
        self.scope = ContextScope::resource(resource);
        self
    }

    pub fn with_scope(mut self, scope: ContextScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_intent(mut self, intent: IntentType) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_incident_start(mut self, at: DateTime<Utc>) -> Self {
        self.incident_start = Some(at);
        self
    }
}

/// Everything the driver reads, shared by every clone of the engine
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) registry: SessionRegistry,
    pub(crate) scheduler: Scheduler,
    pub(crate) events: EventBus,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) metrics: VigilMetrics,
    pub(crate) context: ContextBuilder,
    pub(crate) cache: Option<Arc<ResourceCache>>,
    pub(crate) tools: RetryingInvoker,
    pub(crate) generator: Arc<dyn HypothesisGenerator>,
    pub(crate) classifier: Arc<dyn IntentClassifier>,
    pub(crate) base_rates: BaseRateTable,
    pub(crate) gate: SafetyGate,
    pub(crate) executor: Option<Executor>,
    pub(crate) likelihoods: LikelihoodTable,
    pub(crate) plausibility: PlausibilityCheck,
    pub(crate) scorer: ConfidenceScorer,
    pub(crate) synthesizer: RecommendationSynthesizer,
}

/// Cheap to clone; clones share sessions and collaborators
#[derive(Clone)]
pub struct InvestigationEngine {
    inner: Arc<EngineInner>,
}

impl InvestigationEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub(crate) fn from_inner(inner: EngineInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &VigilMetrics {
        &self.inner.metrics
    }

    pub fn concurrency(&self) -> ConcurrencySnapshot {
        self.inner.scheduler.snapshot()
    }

    pub fn action_backend_configured(&self) -> bool {
        self.inner.executor.is_some()
    }

    // ========== Running investigations ==========

    /// Register a new investigation without running it
    pub async fn start(&self, request: InvestigationRequest) -> EngineResult<InvestigationId> {
        let id = InvestigationId::generate();
        let incident_start = request.incident_start.unwrap_or_else(Utc::now);
        let mut session = Session::new(
            id,
            request.query,
            request.scope,
            incident_start,
            &self.inner.config,
        );
        if let Some(intent) = request.intent {
            session.intent = Some(IntentClassification::certain(intent));
        }

        self.inner
            .record(
                AuditEntry::builder()
                    .investigation(id)
                    .action(AuditAction::InvestigationStarted)
                    .detail("query", &session.query)
                    .detail("scope", &session.scope)
                    .detail("incident_start", incident_start)
                    .build(),
            )
            .await?;
        info!(investigation_id = %id, query = %session.query, "investigation started");
        self.inner.registry.insert(session);
        Ok(id)
    }

    /// Drive an investigation until it parks or finishes.
    ///
    /// Waits for a concurrency permit first; the permit is released when
    /// the session parks.
    #[instrument(skip(self), fields(investigation_id = %id))]
    pub async fn run(&self, id: InvestigationId) -> EngineResult<InvestigationReport> {
        let Some(handle) = self.inner.registry.active(id) else {
            return self.get(id);
        };
        let _permit = self.inner.scheduler.acquire(id).await?;
        {
            let mut session = handle.lock().await;
            self.inner.drive(&handle, &mut session).await;
        }
        self.get(id)
    }

    /// Start and run in one call
    pub async fn investigate(&self, request: InvestigationRequest) -> EngineResult<InvestigationReport> {
        let id = self.start(request).await?;
        self.run(id).await
    }

    /// Start an investigation and run it on its own task
    pub async fn submit(
        &self,
        request: InvestigationRequest,
    ) -> EngineResult<(InvestigationId, JoinHandle<EngineResult<InvestigationReport>>)> {
        let id = self.start(request).await?;
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.run(id).await });
        Ok((id, task))
    }

    /// Answer a clarification round and resume
    pub async fn clarify(
        &self,
        id: InvestigationId,
        intent: IntentType,
    ) -> EngineResult<InvestigationReport> {
        let handle = self.active(id)?;
        {
            let mut session = handle.lock().await;
            if session.state != InvestigationState::Created || session.clarification.is_none() {
                return Err(EngineError::invalid_state(id, session.state, "clarify"));
            }
            info!(investigation_id = %id, %intent, "intent clarified");
            session.intent = Some(IntentClassification::certain(intent));
            session.clarification = None;
            handle.publish(&session);
        }
        self.run(id).await
    }

    // ========== Approval workflow ==========

    /// Approve a recommendation.
    ///
    /// Approving twice is harmless: an approval that already executed, or
    /// is about to, returns the current report.
    #[instrument(skip(self), fields(investigation_id = %id, recommendation = %recommendation))]
    pub async fn approve(
        &self,
        id: InvestigationId,
        recommendation: RecommendationId,
        approver: &str,
    ) -> EngineResult<InvestigationReport> {
        let Some(handle) = self.inner.registry.active(id) else {
            return self.approve_archived(id, recommendation);
        };
        let resume = {
            let mut session = handle.lock().await;
            if session.state.is_terminal() {
                drop(session);
                return self.approve_archived(id, recommendation);
            }
            let resume = self
                .accept_approval(&mut session, recommendation, approver)
                .await;
            handle.publish(&session);
            resume?
        };
        if resume {
            self.run(id).await
        } else {
            self.get(id)
        }
    }

    fn approve_archived(
        &self,
        id: InvestigationId,
        recommendation: RecommendationId,
    ) -> EngineResult<InvestigationReport> {
        let report = self.get(id)?;
        let summary = find_summary(&report, id, recommendation)?;
        if summary.approval_state == ApprovalState::Approved {
            info!(investigation_id = %id, %recommendation, "duplicate approval of a finished investigation");
            return Ok(report);
        }
        Err(EngineError::invalid_state(id, report.state, "approve"))
    }

    /// Record the approval; true when the driver should resume
    async fn accept_approval(
        &self,
        session: &mut Session,
        recommendation: RecommendationId,
        approver: &str,
    ) -> EngineResult<bool> {
        let id = session.id;
        let rec = session
            .recommendation(recommendation)
            .ok_or(EngineError::RecommendationNotFound {
                investigation: id,
                recommendation,
            })?;
        let actionable = rec.disposition.is_actionable();

        match rec.approval_state {
            ApprovalState::Rejected => {
                return Err(EngineError::NotApprovable(
                    recommendation,
                    "already rejected".into(),
                ))
            }
            ApprovalState::Expired => return Err(EngineError::ApprovalExpired(recommendation)),
            ApprovalState::Approved => {
                let executed = session
                    .executions
                    .iter()
                    .any(|e| e.recommendation == recommendation);
                if executed || session.approved.is_some() {
                    info!(investigation_id = %id, %recommendation, "duplicate approval ignored");
                    return Ok(false);
                }
                // Approved earlier while the backend was down.
                return Ok(self.arm(session, recommendation, approver).await);
            }
            ApprovalState::Pending => {}
        }

        if session.state != InvestigationState::AwaitingApproval {
            return Err(EngineError::invalid_state(id, session.state, "approve"));
        }
        if !actionable {
            return Err(EngineError::NotApprovable(
                recommendation,
                "recommendation is not actionable".into(),
            ));
        }
        if let Some(other) = &session.approved {
            return Err(EngineError::NotApprovable(
                recommendation,
                format!("{} is already approved", other.recommendation),
            ));
        }

        let issued = session
            .issued_at
            .get(&recommendation)
            .copied()
            .unwrap_or(session.created_at);
        if Utc::now() - issued > self.inner.config.execution.approval_ttl() {
            self.expire(session, recommendation).await?;
            return Err(EngineError::ApprovalExpired(recommendation));
        }

        if let Some(rec) = session.recommendation_mut(recommendation) {
            rec.approval_state = ApprovalState::Approved;
            rec.status_note = None;
        }
        self.inner
            .record(
                AuditEntry::builder()
                    .investigation(id)
                    .actor(AuditActor::user(approver))
                    .action(AuditAction::ApprovalGranted)
                    .detail("recommendation", recommendation)
                    .build(),
            )
            .await?;
        info!(investigation_id = %id, %recommendation, %approver, "recommendation approved");
        Ok(self.arm(session, recommendation, approver).await)
    }

    /// Issue the execution token if the backend can take it
    async fn arm(&self, session: &mut Session, recommendation: RecommendationId, approver: &str) -> bool {
        let executor = match &self.inner.executor {
            Some(executor) if executor.backend().is_available().await => executor,
            _ => {
                warn!(investigation_id = %session.id, %recommendation, "action backend unavailable, approval held");
                session.action_backend_available = false;
                if let Some(rec) = session.recommendation_mut(recommendation) {
                    rec.status_note = Some("approved; action backend unavailable".into());
                }
                return false;
            }
        };
        let correlation = CorrelationId::for_recommendation(&session.id, &recommendation);
        let token = executor.issue_token(recommendation, correlation, approver, Utc::now());
        session.action_backend_available = true;
        session.approved = Some(ApprovedAction {
            recommendation,
            token,
            autonomous: false,
        });
        true
    }

    async fn expire(&self, session: &mut Session, recommendation: RecommendationId) -> EngineResult<()> {
        if let Some(rec) = session.recommendation_mut(recommendation) {
            rec.approval_state = ApprovalState::Expired;
            rec.status_note = Some("approval window elapsed".into());
        }
        self.inner
            .record(
                AuditEntry::builder()
                    .investigation(session.id)
                    .action(AuditAction::ApprovalExpired)
                    .outcome(AuditOutcome::denied("approval window elapsed"))
                    .detail("recommendation", recommendation)
                    .build(),
            )
            .await?;
        info!(investigation_id = %session.id, %recommendation, "approval expired");
        Ok(())
    }

    /// Reject a pending recommendation; the session stays parked
    pub async fn reject(
        &self,
        id: InvestigationId,
        recommendation: RecommendationId,
        approver: &str,
        reason: &str,
    ) -> EngineResult<InvestigationReport> {
        let handle = self.active(id)?;
        let mut session = handle.lock().await;
        if session.state != InvestigationState::AwaitingApproval {
            return Err(EngineError::invalid_state(id, session.state, "reject"));
        }
        let rec = session
            .recommendation_mut(recommendation)
            .ok_or(EngineError::RecommendationNotFound {
                investigation: id,
                recommendation,
            })?;
        if rec.approval_state != ApprovalState::Pending {
            return Err(EngineError::NotApprovable(
                recommendation,
                format!("approval state is {:?}", rec.approval_state).to_lowercase(),
            ));
        }
        rec.approval_state = ApprovalState::Rejected;
        rec.status_note = Some(format!("rejected by {approver}: {reason}"));
        let excluded = (rec.action.kind, rec.action.target.clone());
        session.exclusions.push(excluded);

        self.inner
            .record(
                AuditEntry::builder()
                    .investigation(id)
                    .actor(AuditActor::user(approver))
                    .action(AuditAction::ApprovalRejected)
                    .outcome(AuditOutcome::denied(reason))
                    .detail("recommendation", recommendation)
                    .build(),
            )
            .await?;
        info!(investigation_id = %id, %recommendation, %approver, "recommendation rejected");
        handle.publish(&session);
        Ok(handle.report())
    }

    /// Reject what is pending and synthesize again without it
    pub async fn request_alternatives(
        &self,
        id: InvestigationId,
        actor: &str,
    ) -> EngineResult<InvestigationReport> {
        let handle = self.active(id)?;
        {
            let mut session = handle.lock().await;
            self.ensure_parked_for_decision(&session, "request_alternatives")?;

            let pending: Vec<RecommendationId> = session
                .recommendations
                .iter()
                .filter(|r| r.is_pending())
                .map(|r| r.id)
                .collect();
            for rec_id in &pending {
                if let Some(rec) = session.recommendation_mut(*rec_id) {
                    rec.approval_state = ApprovalState::Rejected;
                    rec.status_note = Some(format!("alternatives requested by {actor}"));
                    let excluded = (rec.action.kind, rec.action.target.clone());
                    session.exclusions.push(excluded);
                }
            }
            self.inner
                .record(
                    AuditEntry::builder()
                        .investigation(id)
                        .actor(AuditActor::user(actor))
                        .action(AuditAction::ApprovalRejected)
                        .outcome(AuditOutcome::denied("alternatives requested"))
                        .detail("recommendations", &pending)
                        .build(),
                )
                .await?;
            self.inner
                .transition(
                    &mut session,
                    InvestigationState::Recommending,
                    format!("alternatives requested by {actor}"),
                )
                .await?;
            handle.publish(&session);
        }
        self.run(id).await
    }

    /// Gather more evidence before deciding
    pub async fn request_deeper_evidence(
        &self,
        id: InvestigationId,
        actor: &str,
    ) -> EngineResult<InvestigationReport> {
        let handle = self.active(id)?;
        {
            let mut session = handle.lock().await;
            self.ensure_parked_for_decision(&session, "request_deeper_evidence")?;

            let extension = self.inner.config.budgets.deeper_evidence_extension;
            session.budget.extend_calls(extension);
            session.evidence_floor = session.budget.usage().tool_calls + extension;
            session.budget_stop = None;
            for h in session.hypotheses.iter_mut() {
                if h.status == HypothesisStatus::Confirmed {
                    h.status = HypothesisStatus::Active;
                }
            }
            for rec in session.recommendations.iter_mut().filter(|r| r.is_pending()) {
                rec.approval_state = ApprovalState::Expired;
                rec.status_note = Some("superseded by deeper evidence".into());
            }
            self.inner
                .transition(
                    &mut session,
                    InvestigationState::Investigating,
                    format!("{actor} requested {extension} more tool calls"),
                )
                .await?;
            handle.publish(&session);
        }
        self.run(id).await
    }

    fn ensure_parked_for_decision(&self, session: &Session, operation: &'static str) -> EngineResult<()> {
        if session.state != InvestigationState::AwaitingApproval || session.approved.is_some() {
            return Err(EngineError::invalid_state(session.id, session.state, operation));
        }
        Ok(())
    }

    /// Expire pending recommendations older than the approval TTL
    pub async fn expire_stale_approvals(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let ttl = self.inner.config.execution.approval_ttl();
        let mut expired = 0;
        for handle in self.inner.registry.active_handles() {
            let mut session = handle.lock().await;
            if session.state != InvestigationState::AwaitingApproval {
                continue;
            }
            let stale: Vec<RecommendationId> = session
                .recommendations
                .iter()
                .filter(|r| r.is_pending())
                .filter(|r| {
                    session
                        .issued_at
                        .get(&r.id)
                        .is_some_and(|issued| now - *issued > ttl)
                })
                .map(|r| r.id)
                .collect();
            for rec in stale {
                self.expire(&mut session, rec).await?;
                expired += 1;
            }
            handle.publish(&session);
        }
        Ok(expired)
    }

    /// Cancel an investigation.
    ///
    /// A session mid-execution finishes and verifies its action first.
    #[instrument(skip(self), fields(investigation_id = %id))]
    pub async fn cancel(&self, id: InvestigationId) -> EngineResult<InvestigationReport> {
        let Some(handle) = self.inner.registry.active(id) else {
            return self.get(id);
        };
        handle.request_cancel();
        {
            let mut session = handle.lock().await;
            if !session.state.is_terminal() {
                self.inner.cancel_now(&mut session).await?;
                handle.publish(&session);
            }
        }
        self.get(id)
    }

    // ========== Queries ==========

    fn active(&self, id: InvestigationId) -> EngineResult<Arc<SessionHandle>> {
        match self.inner.registry.active(id) {
            Some(handle) => Ok(handle),
            None => match self.inner.registry.record(id) {
                Some(record) => Err(EngineError::invalid_state(
                    id,
                    record.report.state,
                    "modify a finished investigation",
                )),
                None => Err(EngineError::NotFound(id)),
            },
        }
    }

    /// Latest report, live or archived
    pub fn get(&self, id: InvestigationId) -> EngineResult<InvestigationReport> {
        self.inner
            .registry
            .report(id)
            .ok_or(EngineError::NotFound(id))
    }

    pub fn list(&self) -> Vec<InvestigationReport> {
        self.inner.registry.list()
    }

    /// Archived record of a finished investigation
    pub fn record(&self, id: InvestigationId) -> Option<Arc<InvestigationRecord>> {
        self.inner.registry.record(id)
    }

    /// Recommendations waiting for a human, per investigation
    pub fn pending_approvals(&self) -> Vec<(InvestigationId, RecommendationSummary)> {
        self.list()
            .into_iter()
            .filter(|r| r.state == InvestigationState::AwaitingApproval)
            .flat_map(|r| {
                let id = r.id;
                r.pending_approvals()
                    .cloned()
                    .map(move |s| (id, s))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvestigationEvent> {
        self.inner.events.subscribe()
    }

    pub async fn audit_trail(&self, id: InvestigationId) -> EngineResult<Vec<AuditEntry>> {
        Ok(self.inner.audit.entries_for(id).await?)
    }

    // ========== Policy and state feed ==========

    /// Current policy snapshot
    pub fn policy(&self) -> Arc<PolicySnapshot> {
        self.inner.gate.policy()
    }

    /// Compile and swap in a new safety policy; returns its version.
    ///
    /// Decisions already in flight keep the snapshot they started with.
    pub async fn update_policy(&self, config: SafetyConfig, actor: &str) -> EngineResult<u64> {
        let snapshot = self.inner.gate.store().replace(&config)?;
        self.inner
            .record(
                AuditEntry::builder()
                    .actor(AuditActor::user(actor))
                    .action(AuditAction::PolicyUpdated)
                    .detail("version", snapshot.version)
                    .detail("policy", &snapshot.source)
                    .build(),
            )
            .await?;
        Ok(snapshot.version)
    }

    /// Feed one change event into the resource cache, if there is one
    pub fn ingest(&self, event: ChangeEvent) -> Option<ApplyOutcome> {
        self.inner.cache.as_ref().map(|cache| cache.apply(event))
    }
}

fn find_summary(
    report: &InvestigationReport,
    id: InvestigationId,
    recommendation: RecommendationId,
) -> EngineResult<&RecommendationSummary> {
    report
        .recommendations
        .iter()
        .find(|r| r.id == recommendation)
        .ok_or(EngineError::RecommendationNotFound {
            investigation: id,
            recommendation,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedToolInvoker, StaticContextSource};
    use serde_json::json;

    fn engine() -> InvestigationEngine {
        EngineBuilder::default()
            .with_tool_invoker(Arc::new(
                ScriptedToolInvoker::new().with_default(json!({ "signals": [] })),
            ))
            .with_context_source(Arc::new(StaticContextSource::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_ambiguous_query_parks_for_clarification() {
        let engine = engine();
        let target = ResourceRef::namespaced("Deployment", "web", "api");
        let report = engine
            .investigate(InvestigationRequest::new("api").with_target(target))
            .await
            .unwrap();
        assert_eq!(report.state, InvestigationState::Created);
        assert!(report.clarification.is_some());
        assert_eq!(engine.concurrency().in_flight, 0);

        let report = engine.clarify(report.id, IntentType::Informational).await.unwrap();
        assert_eq!(report.state, InvestigationState::Completed);
        assert!(report.clarification.is_none());
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_clarify_requires_pending_round() {
        let engine = engine();
        let id = engine
            .start(InvestigationRequest::new("why is api failing").with_intent(IntentType::Diagnosis))
            .await
            .unwrap();
        assert!(matches!(
            engine.clarify(id, IntentType::Diagnosis).await,
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_investigation() {
        let engine = engine();
        let id = InvestigationId::generate();
        assert!(matches!(engine.get(id), Err(EngineError::NotFound(_))));
        assert!(matches!(engine.cancel(id).await, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_policy_update_bumps_version() {
        let engine = engine();
        let mut config = engine.config().safety_config();
        config.autonomy.default_level = vigil_types::AutonomyLevel::Act;
        let version = engine.update_policy(config, "ops").await.unwrap();
        assert_eq!(version, 2);
        assert_eq!(engine.policy().version, 2);
    }

    #[tokio::test]
    async fn test_ingest_without_cache() {
        let engine = engine();
        let event = ChangeEvent {
            resource_kind: "Deployment".into(),
            name: "api".into(),
            namespace: Some("web".into()),
            change_type: vigil_types::ChangeType::Added,
            timestamp: Utc::now(),
            resource_version: 1,
            full_state: json!({ "replicas": 2 }),
        };
        assert!(engine.ingest(event).is_none());
    }
}
