//! Property tests: hard guardrails dominate risk score and autonomy level.

use chrono::Utc;
use proptest::prelude::*;
use std::sync::Arc;
use vigil_safety::{
    AutonomousActionLedger, AutonomyPolicy, PolicyStore, RiskAssessor, RiskFactors, SafetyConfig,
    SafetyGate, GateRequest,
};
use vigil_types::{ActionKind, AutonomyLevel, Disposition, ProposedAction, ResourceRef};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arb_level() -> impl Strategy<Value = AutonomyLevel> {
    prop::sample::select(AutonomyLevel::ALL.to_vec())
}

fn arb_factors() -> impl Strategy<Value = RiskFactors> {
    (0..=10u8, 0..=10u8, 0..=10u8, 0..=10u8, 0..=10u8, 0..=10u8).prop_map(
        |(blast_radius, irreversibility, data_loss, service_disruption, cost_impact, inverse_confidence)| {
            RiskFactors {
                blast_radius,
                irreversibility,
                data_loss,
                service_disruption,
                cost_impact,
                inverse_confidence,
            }
        },
    )
}

/// Actions that always trip at least one hard guardrail
fn arb_forbidden_action() -> impl Strategy<Value = ProposedAction> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(|name| {
            ProposedAction::new(ActionKind::Scale, ResourceRef::namespaced("Deployment", "web", name))
                .with_param("replicas", 0u64)
                .with_param("current_replicas", 3u64)
        }),
        "[a-z]{1,8}".prop_map(|name| {
            ProposedAction::new(ActionKind::Delete, ResourceRef::cluster_scoped("Namespace", name))
        }),
        "[a-z]{1,8}".prop_map(|name| {
            ProposedAction::new(
                ActionKind::Delete,
                ResourceRef::namespaced("PersistentVolumeClaim", "db", name),
            )
        }),
        prop::sample::select(vec!["kube-system", "kube-public", "kube-node-lease"]).prop_map(|ns| {
            ProposedAction::new(ActionKind::Restart, ResourceRef::namespaced("Deployment", ns, "dns"))
        }),
    ]
}

fn gate_at(level: AutonomyLevel) -> SafetyGate {
    let config = SafetyConfig {
        autonomy: AutonomyPolicy {
            default_level: level,
            rules: vec![],
        },
        ..SafetyConfig::default()
    };
    SafetyGate::new(
        Arc::new(PolicyStore::new(&config).unwrap()),
        Arc::new(AutonomousActionLedger::new()),
    )
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn hard_guardrails_block_regardless_of_score_and_level(
        action in arb_forbidden_action(),
        factors in arb_factors(),
        level in arb_level(),
        confidence in 0.0f64..=1.0,
    ) {
        let gate = gate_at(level);
        let assessment = RiskAssessor::default().assess_factors(factors, 0);
        let decision = gate.evaluate(
            &gate.policy(),
            &GateRequest { action: &action, assessment: &assessment, confidence },
            Utc::now(),
        );
        prop_assert!(
            matches!(decision.disposition, Disposition::Blocked { .. }),
            "score {} level {} gave {:?}", assessment.score, level, decision.disposition
        );
    }

    #[test]
    fn risk_score_is_bounded(factors in arb_factors()) {
        let a = RiskAssessor::default().assess_factors(factors, 0);
        prop_assert!(a.score <= 100);
    }
}

#[test]
fn scale_to_zero_with_score_ten_is_blocked() {
    let gate = gate_at(AutonomyLevel::Act);
    let assessment = RiskAssessor::default().assess_factors(
        RiskFactors {
            blast_radius: 5,
            ..RiskFactors::default()
        },
        0,
    );
    assert_eq!(assessment.score, 10);
    let action = ProposedAction::new(
        ActionKind::Scale,
        ResourceRef::namespaced("Deployment", "web", "api"),
    )
    .with_param("replicas", 0u64);
    let decision = gate.evaluate(
        &gate.policy(),
        &GateRequest {
            action: &action,
            assessment: &assessment,
            confidence: 0.99,
        },
        Utc::now(),
    );
    assert!(decision.is_blocked());
}
