//! Recommendation synthesis: confirmed causes to ranked, reversible actions

use serde_json::{json, Value};
use tracing::debug;
use vigil_safety::{RiskAssessor, RiskContext};
use vigil_types::{
    ActionKind, ApprovalState, ConfidenceBand, Disposition, Evidence, FailureMode, Hypothesis,
    HypothesisId, ProposedAction, Recommendation, RecommendationId, RecommendationTier,
    ResourceRef, RiskBand, RollbackSnapshot,
};

/// One remediation a failure mode suggests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Remedy {
    pub kind: ActionKind,
    pub tier: RecommendationTier,
    pub urgency: f64,
    pub impact: f64,
    pub expected_impact: &'static str,
}

const fn remedy(
    kind: ActionKind,
    tier: RecommendationTier,
    urgency: f64,
    impact: f64,
    expected_impact: &'static str,
) -> Remedy {
    Remedy {
        kind,
        tier,
        urgency,
        impact,
        expected_impact,
    }
}

pub fn remedies_for(mode: FailureMode) -> &'static [Remedy] {
    use ActionKind::*;
    use RecommendationTier::*;
    const RESOURCE_EXHAUSTION: &[Remedy] = &[
        remedy(UpdateResources, Immediate, 0.9, 0.8, "raises limits so the workload stops being OOM-killed or throttled"),
        remedy(Scale, ShortTerm, 0.6, 0.5, "spreads load over one more replica"),
        remedy(Patch, LongTerm, 0.3, 0.7, "lets the workload scale with demand"),
    ];
    const CONFIGURATION_ERROR: &[Remedy] = &[
        remedy(RevertRevision, Immediate, 0.85, 0.85, "restores the last known-good configuration"),
        remedy(Restart, ShortTerm, 0.4, 0.3, "reloads configuration from source"),
    ];
    const DEPENDENCY_FAILURE: &[Remedy] = &[
        remedy(Restart, ShortTerm, 0.5, 0.4, "re-establishes connections to upstream dependencies"),
    ];
    const BAD_DEPLOYMENT: &[Remedy] = &[
        remedy(RevertRevision, Immediate, 0.95, 0.9, "rolls back to the previous revision"),
    ];
    const NODE_PRESSURE: &[Remedy] = &[
        remedy(Cordon, Immediate, 0.8, 0.6, "stops new pods landing on the pressured node"),
        remedy(Drain, ShortTerm, 0.6, 0.7, "moves workloads off the pressured node"),
    ];
    const NETWORK_FAILURE: &[Remedy] = &[
        remedy(Restart, ShortTerm, 0.5, 0.4, "refreshes DNS and connection state"),
    ];
    const APPLICATION_DEFECT: &[Remedy] = &[
        remedy(RevertRevision, Immediate, 0.7, 0.6, "returns to the previous application version"),
        remedy(Restart, ShortTerm, 0.5, 0.3, "clears transient application state"),
    ];
    match mode {
        FailureMode::ResourceExhaustion => RESOURCE_EXHAUSTION,
        FailureMode::ConfigurationError => CONFIGURATION_ERROR,
        FailureMode::DependencyFailure => DEPENDENCY_FAILURE,
        FailureMode::BadDeployment => BAD_DEPLOYMENT,
        FailureMode::NodePressure => NODE_PRESSURE,
        FailureMode::NetworkFailure => NETWORK_FAILURE,
        FailureMode::ApplicationDefect => APPLICATION_DEFECT,
    }
}

/// The `spec` object of a state document, which may be wrapped by the cache
fn spec_of(state: &Value) -> Option<&Value> {
    state
        .get("state")
        .and_then(|s| s.get("spec"))
        .or_else(|| state.get("spec"))
}

fn node_of(target: &ResourceRef, state: Option<&Value>) -> Option<ResourceRef> {
    if target.kind == "Node" {
        return Some(target.clone());
    }
    let spec = state.and_then(spec_of)?;
    let name = spec
        .get("nodeName")
        .or_else(|| spec.get("node_name"))
        .and_then(Value::as_str)?;
    Some(ResourceRef::cluster_scoped("Node", name))
}

/// Build the concrete action for a remedy, if the context supports it
pub fn build_action(kind: ActionKind, target: &ResourceRef, state: Option<&Value>) -> Option<ProposedAction> {
    let action = match kind {
        ActionKind::Scale => {
            let current = state
                .and_then(spec_of)
                .and_then(|s| s.get("replicas"))
                .and_then(Value::as_u64)?;
            ProposedAction::new(kind, target.clone())
                .with_param("replicas", current + 1)
                .with_param("current_replicas", current)
        }
        ActionKind::UpdateResources => {
            ProposedAction::new(kind, target.clone()).with_param("limit_multiplier", 1.5)
        }
        ActionKind::Patch => ProposedAction::new(kind, target.clone())
            .with_param("autoscaling", json!({"enabled": true})),
        ActionKind::Cordon | ActionKind::Drain => ProposedAction::new(kind, node_of(target, state)?),
        ActionKind::Restart | ActionKind::RevertRevision => ProposedAction::new(kind, target.clone()),
        // Never proposed from reasoning.
        ActionKind::Delete | ActionKind::ApplySnapshot => return None,
    };
    Some(action)
}

/// Everything synthesis reads
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub hypotheses: &'a [Hypothesis],
    pub confirmed: &'a [HypothesisId],
    pub evidence: &'a [Evidence],
    pub target: &'a ResourceRef,
    /// Last known state of the target, from the context packet
    pub current_state: Option<&'a Value>,
    pub blast_radius: usize,
    /// Actions already rejected in this investigation
    pub exclude: &'a [(ActionKind, ResourceRef)],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendationSynthesizer;

impl RecommendationSynthesizer {
    /// Ranked recommendations: by tier, then by urgency x confidence x impact
    pub fn synthesize(&self, input: &SynthesisInput<'_>, assessor: &RiskAssessor) -> Vec<Recommendation> {
        let mut out: Vec<Recommendation> = Vec::new();
        for id in input.confirmed {
            let Some(hypothesis) = input.hypotheses.iter().find(|h| h.id == *id) else {
                continue;
            };
            for remedy in remedies_for(hypothesis.failure_mode) {
                let Some(action) = build_action(remedy.kind, input.target, input.current_state) else {
                    continue;
                };
                if input
                    .exclude
                    .iter()
                    .any(|(kind, target)| *kind == action.kind && *target == action.target)
                {
                    debug!(action = %action, "skipping previously rejected action");
                    continue;
                }
                let rec = self.recommend(hypothesis, remedy, action, input, assessor);
                match out
                    .iter_mut()
                    .find(|r| r.action.kind == rec.action.kind && r.action.target == rec.action.target)
                {
                    Some(existing) if existing.composite >= rec.composite => {}
                    Some(existing) => *existing = rec,
                    None => out.push(rec),
                }
            }
        }
        out.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then(b.composite.total_cmp(&a.composite))
                .then(a.action.kind.cmp(&b.action.kind))
        });
        out
    }

    fn recommend(
        &self,
        hypothesis: &Hypothesis,
        remedy: &Remedy,
        action: ProposedAction,
        input: &SynthesisInput<'_>,
        assessor: &RiskAssessor,
    ) -> Recommendation {
        let confidence = hypothesis.posterior;
        let assessment = assessor.assess(
            &action,
            &RiskContext {
                blast_radius: input.blast_radius,
                confidence,
            },
        );

        let chain: Vec<&Evidence> = input
            .evidence
            .iter()
            .filter(|e| e.contribution_for(hypothesis.id).is_some_and(|c| c.supports()))
            .collect();
        let cited: Vec<String> = chain.iter().map(|e| format!("{} ({})", e.id, e.finding)).collect();
        let justification = format!(
            "{} \"{}\" is at {:.2} ({}); {}",
            hypothesis.id,
            hypothesis.description,
            confidence,
            ConfidenceBand::from_posterior(confidence).label(),
            if cited.is_empty() {
                "no single evidence item dominates".to_string()
            } else {
                format!("supported by {}", cited.join(", "))
            }
        );

        let rollback_state = if action.target == *input.target {
            input.current_state.cloned().unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        let needs_explanation = matches!(
            assessment.band,
            RiskBand::ApprovalWithExplanation | RiskBand::FindingOnly
        );

        Recommendation {
            id: RecommendationId::generate(),
            hypothesis: hypothesis.id,
            justification,
            evidence_chain: chain.iter().map(|e| e.id).collect(),
            expected_impact: format!("{}: {}", action.describe(), remedy.expected_impact),
            tier: remedy.tier,
            urgency: remedy.urgency,
            confidence,
            impact: remedy.impact,
            composite: remedy.urgency * confidence * remedy.impact,
            risk_score: assessment.score,
            risk_band: assessment.band,
            risk_explanation: needs_explanation.then(|| assessment.summary()),
            rollback_plan: RollbackSnapshot::new(action.target.clone(), rollback_state),
            approval_state: ApprovalState::Pending,
            required_level: None,
            disposition: Disposition::Undecided,
            simulation: None,
            status_note: None,
            action,
        }
    }
}
