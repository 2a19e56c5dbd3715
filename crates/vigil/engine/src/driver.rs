//! Step-by-step driver of one session
//!
//! Each call to [`EngineInner::step`] performs the work of the current
//! state and either moves on or parks the session. Parked sessions wait for
//! a clarification or an approval decision without holding a permit.

use crate::budget::estimate_tokens;
use crate::engine::EngineInner;
use crate::error::{EngineError, EngineResult};
use crate::events::InvestigationEventKind;
use crate::execution::{RollbackOutcome, VerificationOutcome};
use crate::registry::SessionHandle;
use crate::report::InvestigationReport;
use crate::session::{ApprovedAction, Session};
use crate::tools::ToolRequest;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use vigil_context::ContextPacket;
use vigil_observability::{
    AuditAction, AuditActor, AuditEntry, AuditOutcome, ObservabilityError, PartialAuditEntry,
};
use vigil_reasoning::{
    bayes, clarification_for, interpret, replay_posteriors, Conclusion, EvidenceQuery,
    GenerationRequest, Separation, SynthesisInput,
};
use vigil_safety::risk::RiskContext;
use vigil_safety::simulate::project;
use vigil_safety::{GateRequest, SYSTEM_APPROVER};
use vigil_types::{
    ApprovalState, CorrelationId, Disposition, Evidence, HypothesisStatus, InvestigationState,
    RiskBand,
};

/// What the driver does after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    /// Wait for an outside decision
    Park,
}

const ENGINE: &str = "engine";

/// Tolerance for replayed posteriors
const REPLAY_EPSILON: f64 = 1e-9;

impl EngineInner {
    /// Drive `session` until it parks or terminates
    #[instrument(skip(self, handle, session), fields(investigation_id = %session.id))]
    pub(crate) async fn drive(&self, handle: &SessionHandle, session: &mut Session) {
        session.budget.resume();
        while !session.state.is_terminal() {
            if handle.cancel_requested() && !session.state.is_mutating() {
                if let Err(err) = self.cancel_now(session).await {
                    error!(error = %err, "cancellation could not be recorded");
                }
                handle.publish(session);
                break;
            }
            let step = match self.step(handle, session).await {
                Ok(step) => step,
                Err(err) => {
                    self.abort(session, &err).await;
                    Step::Continue
                }
            };
            handle.publish(session);
            if step == Step::Park {
                debug!(state = %session.state, "session parked");
                break;
            }
        }
        session.budget.pause();
        handle.publish(session);
    }

    async fn step(&self, handle: &SessionHandle, session: &mut Session) -> EngineResult<Step> {
        match session.state {
            InvestigationState::Created => self.classify(session).await,
            InvestigationState::Observing => self.observe(session).await,
            InvestigationState::Hypothesizing => self.hypothesize(session).await,
            InvestigationState::Investigating => self.investigate(session).await,
            InvestigationState::Analyzing => self.analyze(session).await,
            InvestigationState::Concluding => self.conclude(session).await,
            InvestigationState::Recommending => self.recommend(session).await,
            InvestigationState::AwaitingApproval => self.await_approval(session).await,
            InvestigationState::Executing => self.execute(session).await,
            InvestigationState::Verifying => self.verify(handle, session).await,
            InvestigationState::Completed
            | InvestigationState::Failed
            | InvestigationState::Timedout
            | InvestigationState::Cancelled => Ok(Step::Park),
        }
    }

    // ========== Bookkeeping ==========

    /// Write one audit entry, returning its id
    pub(crate) async fn record(
        &self,
        entry: Result<PartialAuditEntry, &'static str>,
    ) -> EngineResult<Uuid> {
        let partial = entry.map_err(|e| ObservabilityError::Audit(e.to_string()))?;
        let written = self.audit.write(partial).await?;
        Ok(written.id)
    }

    /// Transition, audit and announce; terminal states are archived
    pub(crate) async fn transition(
        &self,
        session: &mut Session,
        to: InvestigationState,
        reason: impl Into<String>,
    ) -> EngineResult<()> {
        let record = session.transition(to, reason)?;
        self.record(
            AuditEntry::builder()
                .investigation(session.id)
                .actor(AuditActor::system(ENGINE))
                .action(AuditAction::StateTransition {
                    from: record.from.to_string(),
                    to: record.to.to_string(),
                })
                .detail("reason", &record.reason)
                .build(),
        )
        .await?;
        self.events.emit(
            session.id,
            InvestigationEventKind::StateChanged {
                from: record.from,
                to: record.to,
                reason: record.reason,
            },
        );

        if to.is_terminal() {
            self.metrics
                .record_terminal(to.as_str(), session.budget.elapsed().as_secs_f64());
            let report = InvestigationReport::from_session(session);
            self.record(
                AuditEntry::builder()
                    .investigation(session.id)
                    .action(AuditAction::InvestigationArchived)
                    .detail("status", report.status)
                    .detail("budgets", report.budgets)
                    .detail("graph_fingerprint", &report.graph_fingerprint)
                    .build(),
            )
            .await?;
            self.registry.archive(session);
        }
        Ok(())
    }

    async fn fail(&self, session: &mut Session, reason: impl Into<String>) -> EngineResult<Step> {
        let reason = reason.into();
        error!(investigation_id = %session.id, %reason, "investigation failed");
        session.failure = Some(reason.clone());
        self.transition(session, InvestigationState::Failed, reason).await?;
        Ok(Step::Continue)
    }

    async fn time_out(&self, session: &mut Session, reason: &str) -> EngineResult<Step> {
        warn!(investigation_id = %session.id, %reason, "investigation timed out");
        session.failure = Some(reason.to_string());
        self.transition(session, InvestigationState::Timedout, reason).await?;
        Ok(Step::Continue)
    }

    /// Last resort for an error inside a step
    async fn abort(&self, session: &mut Session, err: &EngineError) {
        error!(investigation_id = %session.id, state = %session.state, error = %err, "step failed");
        session.failure = Some(err.to_string());
        if session.state.can_transition_to(InvestigationState::Failed) {
            if let Err(err) = self
                .transition(session, InvestigationState::Failed, format!("internal error: {err}"))
                .await
            {
                error!(investigation_id = %session.id, error = %err, "could not record failure");
            }
        } else if let Err(err) = self
            .transition(session, InvestigationState::Cancelled, format!("aborted: {err}"))
            .await
        {
            error!(investigation_id = %session.id, error = %err, "could not record abort");
        }
    }

    /// Apply a cancellation to a session that is not mid-mutation
    pub(crate) async fn cancel_now(&self, session: &mut Session) -> EngineResult<()> {
        if session.state.is_terminal() {
            return Ok(());
        }
        if session.state == InvestigationState::AwaitingApproval {
            session.approved = None;
            self.transition(
                session,
                InvestigationState::Completed,
                "cancelled while awaiting approval",
            )
            .await
        } else {
            self.transition(session, InvestigationState::Cancelled, "cancelled by user")
                .await
        }
    }

    pub(crate) async fn backend_available(&self) -> bool {
        match &self.executor {
            Some(executor) => executor.backend().is_available().await,
            None => false,
        }
    }

    // ========== Created ==========

    async fn classify(&self, session: &mut Session) -> EngineResult<Step> {
        if session.intent.is_none() {
            if session.clarification.is_some() {
                return Ok(Step::Park);
            }
            let remaining = session.budget.remaining_wall_clock();
            let classified =
                tokio::time::timeout(remaining, self.classifier.classify(&session.query)).await;
            let classification = match classified {
                Err(_) => {
                    return self
                        .time_out(session, "intent classifier did not answer within the wall-clock budget")
                        .await
                }
                Ok(Err(err)) => return self.fail(session, format!("intent classification failed: {err}")).await,
                Ok(Ok(classification)) => classification,
            };

            if !classification.is_confident(self.config.reasoning.intent_confidence_threshold) {
                let request = clarification_for(&session.query, &classification);
                info!(
                    investigation_id = %session.id,
                    confidence = classification.confidence,
                    candidates = ?request.candidates,
                    "intent ambiguous, asking for clarification"
                );
                self.record(
                    AuditEntry::builder()
                        .investigation(session.id)
                        .action(AuditAction::ClarificationRequested)
                        .detail("confidence", classification.confidence)
                        .detail("candidates", &request.candidates)
                        .build(),
                )
                .await?;
                self.events.emit(
                    session.id,
                    InvestigationEventKind::ClarificationRequested {
                        message: request.message.clone(),
                    },
                );
                session.clarification = Some(request);
                return Ok(Step::Park);
            }
            session.intent = Some(classification);
        }

        let reason = format!("intent classified as {}", session.intent_type());
        self.transition(session, InvestigationState::Observing, reason).await?;
        Ok(Step::Continue)
    }

    // ========== Observing ==========

    async fn observe(&self, session: &mut Session) -> EngineResult<Step> {
        let packet = self.context.build(session.intent_type(), &session.scope).await;
        let reason = if packet.partial {
            format!("partial context assembled ({} items)", packet.len())
        } else {
            format!("context assembled ({} items)", packet.len())
        };
        session.record_context(packet)?;
        self.transition(session, InvestigationState::Hypothesizing, reason).await?;
        Ok(Step::Continue)
    }

    // ========== Hypothesizing ==========

    async fn hypothesize(&self, session: &mut Session) -> EngineResult<Step> {
        let intent = session.intent_type();
        let packet = session
            .packet
            .clone()
            .unwrap_or_else(|| ContextPacket::new(intent, 0));
        let target = session.target().cloned();
        let remaining = session.budget.remaining_wall_clock();
        let request = GenerationRequest {
            query: &session.query,
            intent,
            target: target.as_ref(),
            context: &packet,
        };
        let generated = tokio::time::timeout(remaining, self.generator.generate(&request)).await;
        let proposals = match generated {
            Err(_) => {
                return self
                    .time_out(session, "hypothesis generator did not answer within the wall-clock budget")
                    .await
            }
            Ok(Err(err)) => return self.fail(session, format!("hypothesis generation failed: {err}")).await,
            Ok(Ok(proposals)) => proposals,
        };

        let kind = target.as_ref().map(|t| t.kind.as_str());
        let hypotheses =
            self.base_rates
                .seed(kind, proposals, self.config.reasoning.max_hypotheses);
        if hypotheses.is_empty() {
            return self.fail(session, "no hypothesis generated").await;
        }

        let tokens: u64 = hypotheses
            .iter()
            .map(|h| estimate_tokens(h.description.len()))
            .sum();
        session.budget.record_tokens(tokens);
        self.record(
            AuditEntry::builder()
                .investigation(session.id)
                .action(AuditAction::HypothesesGenerated)
                .detail(
                    "hypotheses",
                    hypotheses
                        .iter()
                        .map(|h| json!({ "id": h.id, "failure_mode": h.failure_mode, "prior": h.prior }))
                        .collect::<Vec<_>>(),
                )
                .build(),
        )
        .await?;

        let reason = format!("{} hypotheses generated", hypotheses.len());
        session.record_hypotheses(hypotheses)?;
        self.transition(session, InvestigationState::Investigating, reason).await?;
        Ok(Step::Continue)
    }

    // ========== Investigating ==========

    /// Why evidence gathering must stop now, if it must
    fn stop_reason(&self, session: &mut Session) -> Option<String> {
        if let Some(limit) = session.budget.exceeded() {
            let usage = session.budget.usage();
            warn!(
                investigation_id = %session.id,
                %limit,
                tool_calls = usage.tool_calls,
                tokens = usage.tokens,
                "budget exhausted, concluding with the evidence gathered"
            );
            session.budget_stop = Some(limit);
            return Some(format!("{limit} budget exhausted"));
        }
        if !session.tool_backend_available {
            return Some("tool backend unavailable".into());
        }
        let separation = Separation::of(&session.hypotheses);
        if session.budget.usage().tool_calls >= session.evidence_floor
            && separation.is_decisive(&self.config.reasoning)
        {
            if let Some((leader, posterior)) = separation.leader {
                return Some(format!("{leader} converged at {posterior:.2}"));
            }
        }
        None
    }

    /// One tool call per step, checking the stop conditions on both sides
    async fn investigate(&self, session: &mut Session) -> EngineResult<Step> {
        if let Some(reason) = self.stop_reason(session) {
            self.transition(session, InvestigationState::Analyzing, reason).await?;
            return Ok(Step::Continue);
        }
        let Some(target) = session.target().cloned() else {
            self.transition(
                session,
                InvestigationState::Analyzing,
                "no target resource to gather evidence on",
            )
            .await?;
            return Ok(Step::Continue);
        };

        let calls = session.budget.usage().tool_calls;
        session.planner.maybe_switch(calls, &session.hypotheses);
        let Some(query) = session.planner.next(&session.hypotheses, &target) else {
            self.transition(session, InvestigationState::Analyzing, "no evidence query left to run")
                .await?;
            return Ok(Step::Continue);
        };

        self.gather(session, query).await?;
        if session.state.is_terminal() {
            return Ok(Step::Continue);
        }
        if let Some(reason) = self.stop_reason(session) {
            self.transition(session, InvestigationState::Analyzing, reason).await?;
        }
        Ok(Step::Continue)
    }

    async fn gather(&self, session: &mut Session, query: EvidenceQuery) -> EngineResult<()> {
        let request = ToolRequest {
            tool_name: query.tool.clone(),
            parameters: query.parameters.clone(),
            investigation_id: session.id,
        };
        let outcome = self.tools.invoke(&request).await;

        let response = match outcome.result {
            Ok(response) => response,
            Err(err) => {
                session.budget.record_call(0);
                let calls = session.budget.usage().tool_calls;
                self.metrics.record_tool_call(&query.tool, err.code());
                self.events.emit(
                    session.id,
                    InvestigationEventKind::ToolCalled {
                        tool: query.tool.clone(),
                        outcome: err.code().to_string(),
                        calls,
                    },
                );
                self.record(
                    AuditEntry::builder()
                        .investigation(session.id)
                        .action(AuditAction::ToolCalled {
                            tool: query.tool.clone(),
                        })
                        .outcome(AuditOutcome::failure(err.to_string()))
                        .detail("parameters", &query.parameters)
                        .detail("attempts", outcome.attempts)
                        .build(),
                )
                .await?;

                if err.is_fatal() {
                    self.fail(session, format!("{} failed: {err}", query.tool)).await?;
                    return Ok(());
                }
                session.consecutive_tool_failures += 1;
                if session.consecutive_tool_failures >= self.config.tools.unavailable_after_failures {
                    warn!(
                        investigation_id = %session.id,
                        failures = session.consecutive_tool_failures,
                        "tool backend unavailable"
                    );
                    session.tool_backend_available = false;
                }
                return Ok(());
            }
        };

        session.budget.record_call(response.result.to_string().len());
        session.consecutive_tool_failures = 0;
        let calls = session.budget.usage().tool_calls;

        let interpretation = interpret(&query.tool, &response.result);
        let inputs: Vec<bayes::UpdateInput> = session
            .hypotheses
            .iter()
            .filter(|h| h.is_active())
            .map(|h| bayes::UpdateInput {
                hypothesis: h.id,
                likelihood: self
                    .likelihoods
                    .evidence(h.failure_mode, &interpretation.observations),
                plausible: self.plausibility.is_plausible(
                    h.failure_mode,
                    interpretation.change_at,
                    session.incident_start,
                ),
            })
            .collect();
        let contributions = bayes::apply(
            &mut session.hypotheses,
            &inputs,
            self.config.reasoning.refute_threshold,
        );

        let evidence = Evidence {
            id: session.next_evidence_id(),
            tool: query.tool.clone(),
            parameters: query.parameters,
            result: response.result,
            finding: interpretation.finding,
            observations: interpretation.observations,
            contributions,
            change_at: interpretation.change_at,
            latency_ms: response.latency_ms,
            cache_hit: response.cache_hit,
            observed_at: Utc::now(),
        };

        for h in &session.hypotheses {
            if evidence.contribution_for(h.id).is_some() {
                self.events.emit(
                    session.id,
                    InvestigationEventKind::HypothesisUpdated {
                        hypothesis: h.id,
                        posterior: h.posterior,
                    },
                );
            }
        }
        self.metrics.record_tool_call(&query.tool, "success");
        self.events.emit(
            session.id,
            InvestigationEventKind::ToolCalled {
                tool: query.tool.clone(),
                outcome: "success".into(),
                calls,
            },
        );
        self.record(
            AuditEntry::builder()
                .investigation(session.id)
                .action(AuditAction::ToolCalled { tool: query.tool })
                .detail("evidence", evidence.id)
                .detail("finding", &evidence.finding)
                .detail("strategy", query.strategy)
                .detail("attempts", outcome.attempts)
                .detail("latency_ms", evidence.latency_ms)
                .build(),
        )
        .await?;
        debug!(
            investigation_id = %session.id,
            evidence = %evidence.id,
            finding = %evidence.finding,
            calls,
            "evidence recorded"
        );
        session.record_evidence(evidence)?;
        Ok(())
    }

    // ========== Analyzing ==========

    async fn analyze(&self, session: &mut Session) -> EngineResult<Step> {
        let replayed = replay_posteriors(
            &session.hypotheses,
            &session.evidence,
            self.config.reasoning.refute_threshold,
        );
        let drifted = replayed
            .iter()
            .zip(&session.hypotheses)
            .any(|(r, h)| (r.posterior - h.posterior).abs() > REPLAY_EPSILON);
        if drifted {
            warn!(investigation_id = %session.id, "replayed posteriors differ from live scores");
        }
        self.transition(session, InvestigationState::Concluding, "posteriors final")
            .await?;
        Ok(Step::Continue)
    }

    // ========== Concluding ==========

    async fn conclude(&self, session: &mut Session) -> EngineResult<Step> {
        let target = session.target().cloned();
        let suggestions = match &target {
            Some(target) => session.planner.suggestions(&session.hypotheses, target, 3),
            None => Vec::new(),
        };
        let scoring = self
            .scorer
            .score(&mut session.hypotheses, &session.evidence, suggestions);
        let conclusion = scoring.conclusion;
        session.record_conclusion(scoring)?;

        let (to, reason) = if conclusion == Conclusion::Inconclusive {
            (
                InvestigationState::Completed,
                "no hypothesis above 0.50, inconclusive",
            )
        } else if !session.intent_type().implies_action() {
            (
                InvestigationState::Completed,
                "informational intent, no action implied",
            )
        } else if target.is_none() {
            (InvestigationState::Completed, "no target resource to act on")
        } else {
            (InvestigationState::Recommending, "root cause identified")
        };
        self.transition(session, to, reason).await?;
        Ok(Step::Continue)
    }

    // ========== Recommending ==========

    async fn recommend(&self, session: &mut Session) -> EngineResult<Step> {
        // One policy snapshot for the whole batch.
        let snapshot = self.gate.policy();
        let Some(target) = session.target().cloned() else {
            self.transition(session, InvestigationState::Completed, "no target resource to act on")
                .await?;
            return Ok(Step::Continue);
        };
        let (current_state, blast_radius) = session
            .packet
            .as_ref()
            .map(|p| (p.state_of(&target), p.blast_radius()))
            .unwrap_or((None, 1));
        let confirmed = session
            .scoring
            .as_ref()
            .map(|s| s.confirmed.clone())
            .unwrap_or_default();

        let recommendations = self.synthesizer.synthesize(
            &SynthesisInput {
                hypotheses: &session.hypotheses,
                confirmed: &confirmed,
                evidence: &session.evidence,
                target: &target,
                current_state: current_state.as_ref(),
                blast_radius,
                exclude: &session.exclusions,
            },
            &snapshot.risk,
        );
        if recommendations.is_empty() {
            self.transition(
                session,
                InvestigationState::Completed,
                "no applicable remediation left to recommend",
            )
            .await?;
            return Ok(Step::Continue);
        }

        let state = current_state.unwrap_or_else(|| json!({}));
        let mut audit_only = 0usize;
        let mut reported = 0usize;
        for mut rec in recommendations {
            let assessment = self.gate.assess(
                &snapshot,
                &rec.action,
                &RiskContext {
                    blast_radius,
                    confidence: rec.confidence,
                },
            );
            let decision = self.gate.evaluate(
                &snapshot,
                &GateRequest {
                    action: &rec.action,
                    assessment: &assessment,
                    confidence: rec.confidence,
                },
                Utc::now(),
            );

            rec.risk_score = assessment.score;
            rec.risk_band = assessment.band;
            if assessment.band != RiskBand::AutoExecutable {
                rec.risk_explanation = Some(assessment.summary());
            }
            rec.required_level = Some(decision.level);
            if matches!(decision.disposition, Disposition::AwaitApproval { dry_run: true, .. }) {
                rec.simulation = Some(json!({
                    "before": state,
                    "after": project(&rec.action, &state),
                }));
            }
            if !decision.notes.is_empty() {
                rec.status_note = Some(decision.notes.join("; "));
            }

            if decision.is_blocked() {
                for violation in decision.violations.iter().filter(|v| v.is_blocking()) {
                    self.metrics
                        .guardrail_blocks_total
                        .with_label_values(&[&violation.rule.to_string()])
                        .inc();
                }
                self.record(
                    AuditEntry::builder()
                        .investigation(session.id)
                        .action(AuditAction::GuardrailBlocked)
                        .outcome(AuditOutcome::denied(
                            decision
                                .violations
                                .iter()
                                .filter(|v| v.is_blocking())
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join("; "),
                        ))
                        .detail("recommendation", rec.id)
                        .detail("action", rec.action.describe())
                        .detail("risk_score", assessment.score)
                        .build(),
                )
                .await?;
            }

            rec.disposition = decision.disposition;
            self.record(
                AuditEntry::builder()
                    .investigation(session.id)
                    .action(AuditAction::RecommendationIssued)
                    .detail("recommendation", rec.id)
                    .detail("action", rec.action.describe())
                    .detail("tier", rec.tier)
                    .detail("risk_score", rec.risk_score)
                    .detail("level", decision.level)
                    .detail("disposition", &rec.disposition)
                    .detail("policy_version", decision.policy_version)
                    .build(),
            )
            .await?;
            if matches!(rec.disposition, Disposition::AuditOnly { .. }) {
                audit_only += 1;
                continue;
            }
            self.events.emit(
                session.id,
                InvestigationEventKind::RecommendationIssued {
                    recommendation: rec.id,
                    disposition: rec.disposition.clone(),
                },
            );
            session.record_recommendation(rec)?;
            reported += 1;
        }
        if audit_only > 0 && reported == 0 {
            info!(investigation_id = %session.id, withheld = audit_only, "observe level, output kept to the audit record");
            session.audit_only = true;
        }

        let pending = session
            .recommendations
            .iter()
            .filter(|r| r.is_pending() && r.disposition.is_actionable())
            .count();
        if pending == 0 {
            self.transition(
                session,
                InvestigationState::Completed,
                "no actionable recommendation",
            )
            .await?;
            return Ok(Step::Continue);
        }
        self.transition(
            session,
            InvestigationState::AwaitingApproval,
            format!("{pending} recommendation(s) awaiting a decision"),
        )
        .await?;

        let autonomous = session
            .recommendations
            .iter()
            .find(|r| r.is_pending() && r.disposition == Disposition::AutoExecute)
            .map(|r| r.id);
        if let Some(id) = autonomous {
            match &self.executor {
                Some(executor) if executor.backend().is_available().await => {
                    let correlation = CorrelationId::for_recommendation(&session.id, &id);
                    let token = executor.issue_token(id, correlation, SYSTEM_APPROVER, Utc::now());
                    if let Some(rec) = session.recommendation_mut(id) {
                        rec.approval_state = ApprovalState::Approved;
                    }
                    self.record(
                        AuditEntry::builder()
                            .investigation(session.id)
                            .actor(AuditActor::system("autonomy"))
                            .action(AuditAction::ApprovalGranted)
                            .detail("recommendation", id)
                            .detail("approver", SYSTEM_APPROVER)
                            .build(),
                    )
                    .await?;
                    info!(investigation_id = %session.id, recommendation = %id, "auto-executing within policy");
                    session.approved = Some(ApprovedAction {
                        recommendation: id,
                        token,
                        autonomous: true,
                    });
                }
                _ => {
                    session.action_backend_available = false;
                    if let Some(rec) = session.recommendation_mut(id) {
                        rec.status_note = Some("action backend unavailable".into());
                    }
                }
            }
        }
        Ok(Step::Continue)
    }

    // ========== AwaitingApproval ==========

    async fn await_approval(&self, session: &mut Session) -> EngineResult<Step> {
        let Some(approved) = session.approved.as_ref().map(|a| a.recommendation) else {
            return Ok(Step::Park);
        };
        if !self.backend_available().await {
            warn!(investigation_id = %session.id, recommendation = %approved, "action backend unavailable, holding approval");
            session.action_backend_available = false;
            return Ok(Step::Park);
        }
        session.action_backend_available = true;
        self.transition(
            session,
            InvestigationState::Executing,
            format!("{approved} approved"),
        )
        .await?;
        Ok(Step::Continue)
    }

    // ========== Executing ==========

    async fn execute(&self, session: &mut Session) -> EngineResult<Step> {
        let Some(approved) = session.approved.take() else {
            return self.fail(session, "executing without an approval").await;
        };
        let Some(executor) = &self.executor else {
            return self.fail(session, "no action backend configured").await;
        };
        let rec = session
            .recommendation(approved.recommendation)
            .cloned()
            .ok_or(EngineError::RecommendationNotFound {
                investigation: session.id,
                recommendation: approved.recommendation,
            })?;
        let correlation = CorrelationId::for_recommendation(&session.id, &rec.id);

        let now = Utc::now();
        let _permit = if approved.autonomous {
            Some(self.gate.ledger().begin_autonomous(&rec.action.target, now))
        } else {
            self.gate.ledger().record_action(&rec.action.target, now);
            None
        };
        let kind = rec.action.kind.as_str();

        let record = match executor
            .execute(rec.id, &rec.action, &correlation, Some(&approved.token))
            .await
        {
            Ok(record) => record,
            Err(err) => {
                self.metrics
                    .executions_total
                    .with_label_values(&[kind, "refused"])
                    .inc();
                self.record(
                    AuditEntry::builder()
                        .investigation(session.id)
                        .action(AuditAction::ActionExecuted)
                        .outcome(AuditOutcome::denied(err.to_string()))
                        .detail("recommendation", rec.id)
                        .detail("correlation", &correlation)
                        .build(),
                )
                .await?;
                return self
                    .fail(session, format!("execution of {} refused: {err}", rec.action))
                    .await;
            }
        };

        let outcome = if record.fully_applied() {
            "success"
        } else if record.applied() {
            "partial"
        } else {
            "failure"
        };
        self.metrics
            .executions_total
            .with_label_values(&[kind, outcome])
            .inc();
        let audit_outcome = if record.fully_applied() {
            AuditOutcome::Success
        } else {
            AuditOutcome::failure(record.failure_reason())
        };
        let entry = self
            .record(
                AuditEntry::builder()
                    .investigation(session.id)
                    .actor(if approved.autonomous {
                        AuditActor::system("autonomy")
                    } else {
                        AuditActor::user(approved.token.approver.clone())
                    })
                    .action(AuditAction::ActionExecuted)
                    .outcome(audit_outcome)
                    .detail("recommendation", rec.id)
                    .detail("action", rec.action.describe())
                    .detail("correlation", &correlation)
                    .detail("snapshot", &record.snapshot)
                    .detail("autonomous", approved.autonomous)
                    .build(),
            )
            .await?;
        session.last_execution_audit = Some(entry);
        self.events.emit(
            session.id,
            InvestigationEventKind::ExecutionFinished {
                recommendation: rec.id,
                success: record.applied(),
            },
        );

        let reason = if record.applied() {
            format!("{} applied", rec.action)
        } else {
            format!("{} failed: {}", rec.action, record.failure_reason())
        };
        session.record_execution(record)?;
        self.transition(session, InvestigationState::Verifying, reason).await?;
        Ok(Step::Continue)
    }

    // ========== Verifying ==========

    async fn verify(&self, handle: &SessionHandle, session: &mut Session) -> EngineResult<Step> {
        let Some(executor) = &self.executor else {
            return self.fail(session, "no action backend configured").await;
        };
        let Some(record) = session.executions.last().cloned() else {
            return self.fail(session, "nothing executed to verify").await;
        };

        let verification = executor.verify(&record).await;
        if verification.passed() {
            if let Some(rec) = session.recommendation_mut(record.recommendation) {
                rec.status_note = Some("executed and verified".into());
            }
            if handle.cancel_requested() {
                self.transition(
                    session,
                    InvestigationState::Cancelled,
                    "cancelled after the action was verified",
                )
                .await?;
            } else {
                self.transition(session, InvestigationState::Completed, "post-action check passed")
                    .await?;
            }
            return Ok(Step::Continue);
        }

        let trigger = match &verification {
            VerificationOutcome::Failed { reason } => reason.clone(),
            VerificationOutcome::TimedOut => "verification window elapsed".to_string(),
            VerificationOutcome::Passed => String::new(),
        };
        warn!(investigation_id = %session.id, action = %record.action, %trigger, "post-action check failed, rolling back");

        let attempt = executor.rollback(&record, &trigger).await;
        let succeeded = attempt.succeeded();
        self.metrics
            .rollbacks_total
            .with_label_values(&[if succeeded { "succeeded" } else { "failed" }])
            .inc();

        let mut entry = AuditEntry::builder()
            .investigation(session.id)
            .action(AuditAction::RollbackExecuted)
            .outcome(match &attempt.outcome {
                RollbackOutcome::Succeeded => AuditOutcome::Success,
                RollbackOutcome::Failed { reason } => {
                    AuditOutcome::failure(reason.clone())
                }
            })
            .detail("recommendation", record.recommendation)
            .detail("original", &record.correlation)
            .detail("trigger", &trigger)
            .detail("snapshot", &record.snapshot);
        if let Some(original) = session.last_execution_audit {
            entry = entry.related_to(original);
        }
        self.record(entry.build()).await?;
        self.events.emit(
            session.id,
            InvestigationEventKind::RollbackFinished {
                recommendation: record.recommendation,
                success: succeeded,
            },
        );

        session
            .exclusions
            .push((record.action.kind, record.action.target.clone()));
        if let Some(rec) = session.recommendation_mut(record.recommendation) {
            rec.status_note = Some(format!("rolled back: {trigger}"));
        }
        let failure = match &attempt.outcome {
            RollbackOutcome::Failed { reason } => Some(reason.clone()),
            RollbackOutcome::Succeeded => None,
        };
        session.record_rollback(attempt)?;

        if let Some(reason) = failure {
            return self
                .fail(
                    session,
                    format!(
                        "rollback of {} failed after {trigger}: {reason}",
                        record.action
                    ),
                )
                .await;
        }
        if handle.cancel_requested() {
            self.transition(session, InvestigationState::Cancelled, "cancelled after rollback")
                .await?;
            return Ok(Step::Continue);
        }

        for h in session.hypotheses.iter_mut() {
            if h.status == HypothesisStatus::Confirmed {
                h.status = HypothesisStatus::Active;
            }
        }
        for rec in session.recommendations.iter_mut().filter(|r| r.is_pending()) {
            rec.approval_state = ApprovalState::Expired;
            rec.status_note = Some("superseded after rollback".into());
        }
        session
            .budget
            .extend_calls(self.config.budgets.deeper_evidence_extension);
        session.budget_stop = None;
        self.transition(
            session,
            InvestigationState::Investigating,
            format!("post-action check failed ({trigger}), rolled back"),
        )
        .await?;
        Ok(Step::Continue)
    }
}
