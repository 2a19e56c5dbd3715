//! Safety gate: guardrails first, then risk band, then autonomy level

use crate::guardrails::{GuardrailViolation, HardGuardrails};
use crate::ledger::AutonomousActionLedger;
use crate::policy::{PolicySnapshot, PolicyStore};
use crate::risk::{RiskAssessment, RiskContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use vigil_types::{AutonomyLevel, Disposition, ProposedAction, RiskBand};

/// What the gate needs to decide on one recommendation
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    pub action: &'a ProposedAction,
    pub assessment: &'a RiskAssessment,
    /// Posterior of the hypothesis behind the action
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub disposition: Disposition,
    /// Level looked up in the autonomy matrix
    pub level: AutonomyLevel,
    pub policy_version: u64,
    pub violations: Vec<GuardrailViolation>,
    pub notes: Vec<String>,
}

impl GateDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self.disposition, Disposition::Blocked { .. })
    }
}

/// Decides whether a recommendation executes, waits for approval, or is
/// blocked.
pub struct SafetyGate {
    store: Arc<PolicyStore>,
    ledger: Arc<AutonomousActionLedger>,
}

impl SafetyGate {
    pub fn new(store: Arc<PolicyStore>, ledger: Arc<AutonomousActionLedger>) -> Self {
        Self { store, ledger }
    }

    /// Snapshot to evaluate one batch of recommendations against
    pub fn policy(&self) -> Arc<PolicySnapshot> {
        self.store.current()
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<AutonomousActionLedger> {
        &self.ledger
    }

    pub fn assess(
        &self,
        snapshot: &PolicySnapshot,
        action: &ProposedAction,
        ctx: &RiskContext,
    ) -> RiskAssessment {
        snapshot.risk.assess(action, ctx)
    }

    pub fn evaluate(
        &self,
        snapshot: &PolicySnapshot,
        request: &GateRequest<'_>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let action = request.action;
        let band = request.assessment.band;
        let level = snapshot.matrix.lookup(
            &action.target.kind,
            action.target.namespace_or_default(),
            action.category(),
        );

        let mut violations = HardGuardrails::check(action);
        violations.extend(snapshot.policies.iter().filter_map(|p| p.check(action)));

        let decide = |disposition: Disposition, violations: Vec<GuardrailViolation>, notes: Vec<String>| {
            GateDecision {
                disposition,
                level,
                policy_version: snapshot.version,
                violations,
                notes,
            }
        };

        // Hard guardrails and deny policies dominate everything else.
        let blocking: Vec<String> = violations
            .iter()
            .filter(|v| v.is_blocking())
            .map(ToString::to_string)
            .collect();
        if !blocking.is_empty() {
            for reason in &blocking {
                error!(action = %action, %reason, score = request.assessment.score, "guardrail violation, action blocked");
            }
            return decide(Disposition::Blocked { reasons: blocking }, violations, Vec::new());
        }

        if !level.emits_findings() {
            return decide(
                Disposition::AuditOnly {
                    reason: format!("autonomy level {level} permits no output beyond the audit record"),
                },
                violations,
                Vec::new(),
            );
        }

        if !level.emits_recommendations() {
            return decide(
                Disposition::FindingOnly {
                    reason: format!("autonomy level {level} permits findings only"),
                },
                violations,
                Vec::new(),
            );
        }

        if band == RiskBand::FindingOnly {
            return decide(
                Disposition::FindingOnly {
                    reason: format!(
                        "risk score {} is never executed: {}",
                        request.assessment.score,
                        request.assessment.explanation.join(", ")
                    ),
                },
                violations,
                Vec::new(),
            );
        }

        let explanation_required = band == RiskBand::ApprovalWithExplanation;
        let await_approval = |dry_run: bool| Disposition::AwaitApproval {
            explanation_required,
            dry_run,
        };

        let mut notes = Vec::new();
        let disposition = match level {
            AutonomyLevel::Observe | AutonomyLevel::Explain | AutonomyLevel::Recommend => {
                await_approval(false)
            }
            AutonomyLevel::Simulate => await_approval(true),
            AutonomyLevel::Act => {
                let mut downgrades: Vec<GuardrailViolation> = snapshot
                    .soft_guardrails
                    .check(action, request.confidence, &self.ledger, now);
                downgrades.extend(HardGuardrails::check_rate(action, &self.ledger, now));
                // Warn-effect policies are already in `violations`.
                let warned = violations.iter().any(|v| !v.is_blocking());

                if band != RiskBand::AutoExecutable {
                    notes.push(format!("risk band {band} requires approval"));
                    await_approval(false)
                } else if warned || !downgrades.is_empty() {
                    notes.extend(downgrades.iter().map(ToString::to_string));
                    notes.extend(
                        violations
                            .iter()
                            .filter(|v| !v.is_blocking())
                            .map(ToString::to_string),
                    );
                    violations.extend(downgrades);
                    await_approval(false)
                } else {
                    Disposition::AutoExecute
                }
            }
        };

        info!(
            action = %action,
            level = %level,
            score = request.assessment.score,
            policy_version = snapshot.version,
            disposition = ?disposition,
            "safety gate decision"
        );
        decide(disposition, violations, notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autonomy::{AutonomyPolicy, PolicyRule};
    use crate::policy::SafetyConfig;
    use crate::risk::{RiskAssessor, RiskFactors};
    use vigil_types::{ActionKind, ResourceRef};

    fn gate(default_level: AutonomyLevel, rules: Vec<PolicyRule>) -> SafetyGate {
        let config = SafetyConfig {
            autonomy: AutonomyPolicy {
                default_level,
                rules,
            },
            ..SafetyConfig::default()
        };
        SafetyGate::new(
            Arc::new(PolicyStore::new(&config).unwrap()),
            Arc::new(AutonomousActionLedger::new()),
        )
    }

    fn assessment_with_score(target: u8) -> RiskAssessment {
        // Drive the score through the real weights.
        let assessor = RiskAssessor::default();
        (0..=10u8)
            .flat_map(|d| (0..=10u8).flat_map(move |l| (0..=10u8).map(move |b| (d, l, b))))
            .map(|(disruption, loss, blast)| {
                assessor.assess_factors(
                    RiskFactors {
                        service_disruption: disruption,
                        data_loss: loss,
                        blast_radius: blast,
                        ..RiskFactors::default()
                    },
                    0,
                )
            })
            .find(|a| a.score == target)
            .unwrap()
    }

    fn restart(ns: &str) -> ProposedAction {
        ProposedAction::new(ActionKind::Restart, ResourceRef::namespaced("Deployment", ns, "api"))
    }

    #[test]
    fn test_low_risk_act_auto_executes() {
        let g = gate(AutonomyLevel::Act, vec![]);
        let a = assessment_with_score(10);
        let action = restart("web");
        let d = g.evaluate(
            &g.policy(),
            &GateRequest {
                action: &action,
                assessment: &a,
                confidence: 0.95,
            },
            Utc::now(),
        );
        assert_eq!(d.disposition, Disposition::AutoExecute);
    }

    #[test]
    fn test_namespace_recommend_overrides_act_default() {
        let g = gate(
            AutonomyLevel::Act,
            vec![PolicyRule::for_namespace("payments", AutonomyLevel::Recommend)],
        );
        let a = assessment_with_score(25);
        let action = restart("payments");
        let d = g.evaluate(
            &g.policy(),
            &GateRequest {
                action: &action,
                assessment: &a,
                confidence: 0.95,
            },
            Utc::now(),
        );
        assert_eq!(d.level, AutonomyLevel::Recommend);
        assert!(matches!(d.disposition, Disposition::AwaitApproval { .. }));
    }

    #[test]
    fn test_hard_guardrail_beats_low_score() {
        let g = gate(AutonomyLevel::Act, vec![]);
        let a = assessment_with_score(10);
        let action = ProposedAction::new(
            ActionKind::Scale,
            ResourceRef::namespaced("Deployment", "web", "api"),
        )
        .with_param("replicas", 0u64);
        let d = g.evaluate(
            &g.policy(),
            &GateRequest {
                action: &action,
                assessment: &a,
                confidence: 0.99,
            },
            Utc::now(),
        );
        assert!(d.is_blocked());
    }

    #[test]
    fn test_high_risk_is_finding_only_even_at_act() {
        let g = gate(AutonomyLevel::Act, vec![]);
        let a = RiskAssessor::default().assess_factors(
            RiskFactors {
                blast_radius: 10,
                irreversibility: 10,
                data_loss: 10,
                service_disruption: 10,
                cost_impact: 0,
                inverse_confidence: 0,
            },
            600,
        );
        let action = restart("web");
        let d = g.evaluate(
            &g.policy(),
            &GateRequest {
                action: &action,
                assessment: &a,
                confidence: 0.99,
            },
            Utc::now(),
        );
        assert!(matches!(d.disposition, Disposition::FindingOnly { .. }));
    }

    #[test]
    fn test_simulate_level_requests_dry_run() {
        let g = gate(AutonomyLevel::Simulate, vec![]);
        let a = assessment_with_score(60);
        let action = restart("web");
        let d = g.evaluate(
            &g.policy(),
            &GateRequest {
                action: &action,
                assessment: &a,
                confidence: 0.9,
            },
            Utc::now(),
        );
        assert_eq!(
            d.disposition,
            Disposition::AwaitApproval {
                explanation_required: true,
                dry_run: true
            }
        );
    }

    #[test]
    fn test_soft_guardrail_downgrades_to_approval() {
        let g = gate(AutonomyLevel::Act, vec![]);
        let a = assessment_with_score(10);
        let action = restart("web");
        let d = g.evaluate(
            &g.policy(),
            &GateRequest {
                action: &action,
                assessment: &a,
                confidence: 0.55,
            },
            Utc::now(),
        );
        assert!(matches!(d.disposition, Disposition::AwaitApproval { .. }));
        assert!(!d.notes.is_empty());
    }

    #[test]
    fn test_explain_level_yields_findings_only() {
        let g = gate(AutonomyLevel::Explain, vec![]);
        let a = assessment_with_score(10);
        let action = restart("web");
        let d = g.evaluate(
            &g.policy(),
            &GateRequest {
                action: &action,
                assessment: &a,
                confidence: 0.95,
            },
            Utc::now(),
        );
        assert!(matches!(d.disposition, Disposition::FindingOnly { .. }));
    }

    #[test]
    fn test_observe_level_is_audit_only() {
        let g = gate(AutonomyLevel::Observe, vec![]);
        let a = assessment_with_score(10);
        let action = restart("web");
        let d = g.evaluate(
            &g.policy(),
            &GateRequest {
                action: &action,
                assessment: &a,
                confidence: 0.95,
            },
            Utc::now(),
        );
        assert!(matches!(d.disposition, Disposition::AuditOnly { .. }));
        assert_eq!(d.level, AutonomyLevel::Observe);
    }
}
