//! End-to-end investigation scenarios against scripted collaborators.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use vigil_engine::testing::{
    FixedHypothesisGenerator, InMemoryActionBackend, ScriptedToolInvoker, StaticContextSource,
};
use vigil_engine::{
    EngineConfig, EngineError, InvestigationEngine, InvestigationEventKind, InvestigationRequest,
    ReportStatus, ToolError, ToolInvoker, ToolRequest, ToolResponse,
};
use vigil_observability::{ActorType, AuditAction, AuditSink, MemoryAuditSink};
use vigil_reasoning::{BaseRateTable, HypothesisProposal};
use vigil_types::{
    ApprovalState, AutonomyLevel, BudgetLimit, ConfidenceBand, FailureMode, HypothesisStatus,
    IntentType, InvestigationState, ResourceRef,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn target() -> ResourceRef {
    ResourceRef::namespaced("Deployment", "web", "api")
}

fn proposals() -> Vec<HypothesisProposal> {
    vec![
        HypothesisProposal::new("api runs out of memory", FailureMode::ResourceExhaustion),
        HypothesisProposal::new("the latest rollout is broken", FailureMode::BadDeployment),
        HypothesisProposal::new("a config change broke startup", FailureMode::ConfigurationError),
    ]
}

/// Every tool reports OOM kills and memory pressure
fn oom_tools() -> ScriptedToolInvoker {
    ScriptedToolInvoker::new().with_default(json!({ "signals": ["oom_killed", "memory_pressure"] }))
}

/// Every tool answers, none with a recognizable signal
fn neutral_tools() -> ScriptedToolInvoker {
    ScriptedToolInvoker::new().with_default(json!({ "signals": [] }))
}

struct Harness {
    engine: InvestigationEngine,
    tools: Arc<ScriptedToolInvoker>,
    backend: Arc<InMemoryActionBackend>,
    audit: Arc<MemoryAuditSink>,
}

fn harness(config: EngineConfig, tools: ScriptedToolInvoker) -> Harness {
    let tools = Arc::new(tools);
    let backend = Arc::new(
        InMemoryActionBackend::new().with_state(&target(), json!({ "spec": { "replicas": 2 } })),
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = InvestigationEngine::builder(config)
        .with_tool_invoker(tools.clone())
        .with_context_source(Arc::new(StaticContextSource::new()))
        .with_action_backend(backend.clone())
        .with_audit_sink(audit.clone())
        .with_generator(Arc::new(FixedHypothesisGenerator::new(proposals())))
        .with_approval_secret(b"scenario-secret".to_vec())
        .build()
        .unwrap();
    Harness {
        engine,
        tools,
        backend,
        audit,
    }
}

fn diagnosis() -> InvestigationRequest {
    InvestigationRequest::new("why is api crashing")
        .with_target(target())
        .with_intent(IntentType::Diagnosis)
}

fn act_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.autonomy.default_level = AutonomyLevel::Act;
    config
}

// ---------------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn decisive_evidence_confirms_root_cause() {
    let h = harness(EngineConfig::default(), oom_tools());
    let mut events = h.engine.subscribe();

    let report = h.engine.investigate(diagnosis()).await.unwrap();
    assert_eq!(report.state, InvestigationState::AwaitingApproval);
    assert_eq!(report.budgets.tool_calls, 1);
    assert_eq!(h.tools.call_count(), 1);

    let leader = &report.hypotheses[0];
    assert_eq!(leader.failure_mode, FailureMode::ResourceExhaustion);
    assert_eq!(leader.status, HypothesisStatus::Confirmed);
    assert!(leader.posterior > 0.95, "posterior {}", leader.posterior);

    let finding = report.primary_findings().next().unwrap();
    assert_eq!(finding.band, Some(ConfidenceBand::High));
    assert_eq!(finding.hypothesis, Some(leader.id));

    let first = &report.recommendations[0];
    assert!(first.action.starts_with("update_resources"));
    assert_eq!(first.required_level, Some(AutonomyLevel::Recommend));
    assert_eq!(first.approval_state, ApprovalState::Pending);
    assert!(report.pending_approvals().count() >= 1);
    assert_eq!(h.engine.concurrency().in_flight, 0);

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let InvestigationEventKind::StateChanged { to, .. } = event.kind {
            states.push(to);
        }
    }
    assert_eq!(
        states,
        vec![
            InvestigationState::Observing,
            InvestigationState::Hypothesizing,
            InvestigationState::Investigating,
            InvestigationState::Analyzing,
            InvestigationState::Concluding,
            InvestigationState::Recommending,
            InvestigationState::AwaitingApproval,
        ]
    );
}

#[tokio::test]
async fn memory_pressure_separates_after_two_calls() {
    let rates = BTreeMap::from([
        (FailureMode::ResourceExhaustion, 0.4),
        (FailureMode::BadDeployment, 0.3),
        (FailureMode::ConfigurationError, 0.3),
    ]);
    let tools = Arc::new(
        ScriptedToolInvoker::new().with_default(json!({ "signals": ["memory_pressure"] })),
    );
    let engine = InvestigationEngine::builder(EngineConfig::default())
        .with_tool_invoker(tools.clone())
        .with_context_source(Arc::new(StaticContextSource::new()))
        .with_generator(Arc::new(FixedHypothesisGenerator::new(proposals())))
        .with_base_rates(BaseRateTable::default().with_kind("Deployment", rates))
        .build()
        .unwrap();

    let report = engine.investigate(diagnosis()).await.unwrap();

    let mut priors: Vec<f64> = report.hypotheses.iter().map(|h| h.prior).collect();
    priors.sort_by(|a, b| b.total_cmp(a));
    assert!((priors[0] - 0.4).abs() < 1e-9);
    assert!((priors[1] - 0.3).abs() < 1e-9);
    assert!((priors[2] - 0.3).abs() < 1e-9);

    assert_eq!(report.budgets.tool_calls, 2);
    assert_eq!(tools.call_count(), 2);
    assert_eq!(report.budget_stop, None);
    assert!(report.transitions.iter().any(|t| {
        t.from == InvestigationState::Investigating && t.to == InvestigationState::Analyzing
    }));

    let leader = &report.hypotheses[0];
    assert_eq!(leader.failure_mode, FailureMode::ResourceExhaustion);
    assert!(leader.posterior > 0.85, "posterior {}", leader.posterior);

    let finding = report.primary_findings().next().unwrap();
    assert_eq!(finding.hypothesis, Some(leader.id));
    assert_eq!(finding.band.map(|b| b.label()), Some("high confidence"));
}

#[tokio::test]
async fn observe_level_writes_only_the_audit_record() {
    let mut config = EngineConfig::default();
    config.autonomy.default_level = AutonomyLevel::Observe;
    let h = harness(config, oom_tools());

    let report = h.engine.investigate(diagnosis()).await.unwrap();
    assert_eq!(report.state, InvestigationState::Completed);
    assert!(report.audit_only);
    assert!(report.findings.is_empty());
    assert!(report.hypotheses.is_empty());
    assert!(report.next_steps.is_empty());
    assert!(report.recommendations.is_empty());
    assert_eq!(h.backend.execution_count(), 0);

    let trail = h.audit.entries_for(report.id).await.unwrap();
    let issued: Vec<_> = trail
        .iter()
        .filter(|e| e.action == AuditAction::RecommendationIssued)
        .collect();
    assert!(!issued.is_empty());
    for entry in issued {
        assert_eq!(entry.details["disposition"]["disposition"], json!("audit_only"));
        assert_eq!(entry.details["level"], json!("observe"));
    }
}

#[tokio::test]
async fn neutral_evidence_ends_inconclusive_at_budget() {
    let h = harness(EngineConfig::default(), neutral_tools());

    let report = h.engine.investigate(diagnosis()).await.unwrap();
    assert_eq!(report.state, InvestigationState::Completed);
    assert_eq!(report.status, ReportStatus::Inconclusive);
    assert_eq!(report.budgets.tool_calls, 15);
    assert_eq!(report.budget_stop, Some(BudgetLimit::ToolCalls));
    assert!(!report.next_steps.is_empty());
    assert!(report.recommendations.is_empty());
    assert!(h.engine.record(report.id).is_some());
}

#[tokio::test]
async fn informational_intent_reports_findings_only() {
    let h = harness(EngineConfig::default(), oom_tools());
    let report = h
        .engine
        .investigate(
            InvestigationRequest::new("describe api")
                .with_target(target())
                .with_intent(IntentType::Informational),
        )
        .await
        .unwrap();
    assert_eq!(report.state, InvestigationState::Completed);
    assert_eq!(report.status, ReportStatus::FindingsOnly);
    assert!(report.recommendations.is_empty());
    assert_eq!(h.backend.execution_count(), 0);
}

#[tokio::test]
async fn missing_tool_fails_the_investigation() {
    let h = harness(EngineConfig::default(), ScriptedToolInvoker::new());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    assert_eq!(report.state, InvestigationState::Failed);
    assert!(report.failure.unwrap().contains("NOT_FOUND"));
}

/// Every call times out
struct DownInvoker;

#[async_trait::async_trait]
impl ToolInvoker for DownInvoker {
    async fn invoke(&self, _request: &ToolRequest) -> Result<ToolResponse, ToolError> {
        Err(ToolError::DeadlineExceeded("tool backend unreachable".into()))
    }
}

#[tokio::test]
async fn unreachable_tools_conclude_with_what_is_known() {
    let mut config = EngineConfig::default();
    config.tools.max_retries = 0;
    let engine = InvestigationEngine::builder(config)
        .with_tool_invoker(Arc::new(DownInvoker))
        .with_context_source(Arc::new(StaticContextSource::new()))
        .with_generator(Arc::new(FixedHypothesisGenerator::new(proposals())))
        .build()
        .unwrap();

    let report = engine.investigate(diagnosis()).await.unwrap();
    assert_eq!(report.state, InvestigationState::Completed);
    assert_eq!(report.status, ReportStatus::Inconclusive);
    assert!(!report.tool_backend_available);
    assert_eq!(report.budgets.tool_calls, 3);
}

#[tokio::test(start_paused = true)]
async fn slow_generator_times_out() {
    let mut config = EngineConfig::default();
    config.budgets.max_wall_clock_secs = 1;
    let engine = InvestigationEngine::builder(config)
        .with_tool_invoker(Arc::new(oom_tools()))
        .with_context_source(Arc::new(StaticContextSource::new()))
        .with_generator(Arc::new(
            FixedHypothesisGenerator::new(proposals()).with_delay(Duration::from_secs(5)),
        ))
        .build()
        .unwrap();

    let report = engine.investigate(diagnosis()).await.unwrap();
    assert_eq!(report.state, InvestigationState::Timedout);
    assert_eq!(report.status, ReportStatus::TimedOut);
}

// ---------------------------------------------------------------------------
// Approval and execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approved_action_executes_and_verifies() {
    let h = harness(EngineConfig::default(), oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let rec = report.recommendations[0].id;

    let done = h.engine.approve(report.id, rec, "alice").await.unwrap();
    assert_eq!(done.state, InvestigationState::Completed);
    assert_eq!(done.status, ReportStatus::Resolved);
    assert_eq!(h.backend.execution_count(), 1);
    let summary = done.recommendations.iter().find(|r| r.id == rec).unwrap();
    assert_eq!(summary.approval_state, ApprovalState::Approved);
    assert_eq!(summary.status_note.as_deref(), Some("executed and verified"));

    // A second approval is a no-op.
    let again = h.engine.approve(report.id, rec, "alice").await.unwrap();
    assert_eq!(again.state, InvestigationState::Completed);
    assert_eq!(h.backend.execution_count(), 1);

    let trail = h.audit.entries_for(report.id).await.unwrap();
    let granted = trail
        .iter()
        .find(|e| e.action == AuditAction::ApprovalGranted)
        .unwrap();
    assert_eq!(granted.actor.actor_type, ActorType::User);
    assert_eq!(granted.actor.id, "alice");
    assert!(trail.iter().any(|e| e.action == AuditAction::ActionExecuted));
    assert_eq!(
        trail.last().map(|e| e.action.clone()),
        Some(AuditAction::InvestigationArchived)
    );
}

#[tokio::test]
async fn act_level_executes_without_a_human() {
    let h = harness(act_config(), oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    assert_eq!(report.state, InvestigationState::Completed);
    assert_eq!(h.backend.execution_count(), 1);
    assert_eq!(report.recommendations[0].approval_state, ApprovalState::Approved);

    let trail = h.engine.audit_trail(report.id).await.unwrap();
    let granted = trail
        .iter()
        .find(|e| e.action == AuditAction::ApprovalGranted)
        .unwrap();
    assert_eq!(granted.actor.actor_type, ActorType::System);
}

#[tokio::test]
async fn namespace_rule_caps_autonomy() {
    let mut config = act_config();
    config.autonomy.rules = vec![vigil_safety::PolicyRule::for_namespace(
        "web",
        AutonomyLevel::Recommend,
    )];
    let h = harness(config, oom_tools());

    let report = h.engine.investigate(diagnosis()).await.unwrap();
    assert_eq!(report.state, InvestigationState::AwaitingApproval);
    assert_eq!(
        report.recommendations[0].required_level,
        Some(AutonomyLevel::Recommend)
    );
    assert_eq!(h.backend.execution_count(), 0);
}

#[tokio::test]
async fn failed_check_rolls_back_and_reinvestigates() {
    let h = harness(EngineConfig::default(), oom_tools());
    h.backend.fail_verification(true);
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let rec = report.recommendations[0].id;

    let after = h.engine.approve(report.id, rec, "alice").await.unwrap();
    assert_eq!(after.rollbacks.len(), 1);
    assert!(after.rollbacks[0].succeeded());
    assert_eq!(
        h.backend.state(&target()),
        Some(json!({ "spec": { "replicas": 2 } }))
    );

    // Back at the approval gate with the rolled-back action excluded.
    assert_eq!(after.state, InvestigationState::AwaitingApproval);
    let rolled_back = after.recommendations.iter().find(|r| r.id == rec).unwrap();
    assert!(rolled_back.status_note.as_deref().unwrap().starts_with("rolled back"));
    let pending: Vec<_> = after.pending_approvals().collect();
    assert!(!pending.is_empty());
    assert!(pending.iter().all(|r| r.action != rolled_back.action));
    assert!(after
        .transitions
        .iter()
        .any(|t| t.from == InvestigationState::Verifying && t.to == InvestigationState::Investigating));
}

#[tokio::test]
async fn failed_rollback_fails_the_investigation() {
    let h = harness(EngineConfig::default(), oom_tools());
    h.backend.fail_verification(true);
    h.backend.fail_rollback(true);
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let rec = report.recommendations[0].id;

    let after = h.engine.approve(report.id, rec, "alice").await.unwrap();
    assert_eq!(after.state, InvestigationState::Failed);
    assert!(!after.rollbacks[0].succeeded());
    assert!(after.failure.unwrap().contains("rollback"));
}

#[tokio::test]
async fn approval_held_while_backend_is_down() {
    let h = harness(EngineConfig::default(), oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let rec = report.recommendations[0].id;

    h.backend.set_available(false);
    let held = h.engine.approve(report.id, rec, "alice").await.unwrap();
    assert_eq!(held.state, InvestigationState::AwaitingApproval);
    assert!(!held.action_backend_available);
    assert_eq!(held.recommendations[0].approval_state, ApprovalState::Approved);
    assert_eq!(h.backend.execution_count(), 0);

    h.backend.set_available(true);
    let done = h.engine.approve(report.id, rec, "alice").await.unwrap();
    assert_eq!(done.state, InvestigationState::Completed);
    assert_eq!(h.backend.execution_count(), 1);
}

#[tokio::test]
async fn rejected_recommendation_cannot_be_approved() {
    let h = harness(EngineConfig::default(), oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let rec = report.recommendations[0].id;

    let after = h
        .engine
        .reject(report.id, rec, "bob", "too disruptive during peak")
        .await
        .unwrap();
    assert_eq!(after.state, InvestigationState::AwaitingApproval);
    assert_eq!(after.recommendations[0].approval_state, ApprovalState::Rejected);

    let err = h.engine.approve(report.id, rec, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::NotApprovable(..)));
}

#[tokio::test]
async fn stale_approval_expires() {
    let mut config = EngineConfig::default();
    config.execution.approval_ttl_secs = 0;
    let h = harness(config, oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let rec = report.recommendations[0].id;

    tokio::time::sleep(Duration::from_millis(5)).await;
    let err = h.engine.approve(report.id, rec, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::ApprovalExpired(_)));
    let report = h.engine.get(report.id).unwrap();
    assert_eq!(report.recommendations[0].approval_state, ApprovalState::Expired);
    assert_eq!(h.backend.execution_count(), 0);
}

#[tokio::test]
async fn sweep_expires_pending_recommendations() {
    let h = harness(EngineConfig::default(), oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let pending = report.pending_approvals().count();
    assert_eq!(h.engine.pending_approvals().len(), pending);

    let later = chrono::Utc::now() + chrono::Duration::hours(2);
    assert_eq!(h.engine.expire_stale_approvals(later).await.unwrap(), pending);
    assert!(h.engine.pending_approvals().is_empty());
}

#[tokio::test]
async fn alternatives_exclude_everything_offered() {
    let h = harness(EngineConfig::default(), oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let offered: Vec<String> = report.recommendations.iter().map(|r| r.action.clone()).collect();

    let after = h.engine.request_alternatives(report.id, "bob").await.unwrap();
    assert!(after
        .recommendations
        .iter()
        .filter(|r| r.approval_state == ApprovalState::Pending)
        .all(|r| !offered.contains(&r.action)));
    assert!(after
        .recommendations
        .iter()
        .take(offered.len())
        .all(|r| r.approval_state == ApprovalState::Rejected));
}

#[tokio::test]
async fn deeper_evidence_gathers_before_reconcluding() {
    let h = harness(EngineConfig::default(), oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let first_batch = report.recommendations.len();

    let after = h.engine.request_deeper_evidence(report.id, "alice").await.unwrap();
    assert_eq!(after.state, InvestigationState::AwaitingApproval);
    assert_eq!(after.budgets.tool_calls, 6);
    assert!(after
        .recommendations
        .iter()
        .take(first_batch)
        .all(|r| r.approval_state == ApprovalState::Expired));
    assert!(after.pending_approvals().count() >= 1);
}

// ---------------------------------------------------------------------------
// Cancellation and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_before_running() {
    let h = harness(EngineConfig::default(), oom_tools());
    let id = h.engine.start(diagnosis()).await.unwrap();
    let report = h.engine.cancel(id).await.unwrap();
    assert_eq!(report.state, InvestigationState::Cancelled);
    assert!(matches!(
        h.engine.request_deeper_evidence(id, "alice").await,
        Err(EngineError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn cancel_while_awaiting_approval_completes() {
    let h = harness(EngineConfig::default(), oom_tools());
    let report = h.engine.investigate(diagnosis()).await.unwrap();
    let cancelled = h.engine.cancel(report.id).await.unwrap();
    assert_eq!(cancelled.state, InvestigationState::Completed);
    assert!(!cancelled.findings.is_empty());
    assert_eq!(h.backend.execution_count(), 0);
}

#[tokio::test]
async fn cancel_interrupts_evidence_gathering() {
    let h = harness(
        EngineConfig::default(),
        neutral_tools().with_latency(Duration::from_millis(20)),
    );
    let (id, task) = h.engine.submit(diagnosis()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = h.engine.cancel(id).await.unwrap();
    assert_eq!(report.state, InvestigationState::Cancelled);
    assert!(report.budgets.tool_calls < 15);
    assert_eq!(task.await.unwrap().unwrap().state, InvestigationState::Cancelled);
}

#[tokio::test]
async fn excess_investigations_queue() {
    let mut config = EngineConfig::default();
    config.concurrency.max_concurrent_investigations = 1;
    config.budgets.max_tool_calls = 3;
    let h = harness(config, neutral_tools().with_latency(Duration::from_millis(50)));

    let (_, first) = h.engine.submit(diagnosis()).await.unwrap();
    let (_, second) = h.engine.submit(diagnosis()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let snapshot = h.engine.concurrency();
    assert_eq!(snapshot.in_flight, 1);
    assert_eq!(snapshot.waiters, 1);

    assert_eq!(first.await.unwrap().unwrap().state, InvestigationState::Completed);
    assert_eq!(second.await.unwrap().unwrap().state, InvestigationState::Completed);
    assert_eq!(h.engine.concurrency().in_flight, 0);
    assert_eq!(h.engine.list().len(), 2);
}
