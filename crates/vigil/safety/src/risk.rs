//! Weighted six-factor risk score

use crate::error::{SafetyError, SafetyResult};
use serde::{Deserialize, Serialize};
use vigil_types::{ActionKind, ProposedAction, RiskBand};

/// Kinds whose loss destroys data when the owner is deleted or drained
const STATEFUL_KINDS: &[&str] = &[
    "StatefulSet",
    "PersistentVolumeClaim",
    "PersistentVolume",
    "Pod",
];

/// Six 0-10 factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskFactors {
    pub blast_radius: u8,
    pub irreversibility: u8,
    pub data_loss: u8,
    pub service_disruption: u8,
    pub cost_impact: u8,
    pub inverse_confidence: u8,
}

impl RiskFactors {
    fn clamped(self) -> Self {
        Self {
            blast_radius: self.blast_radius.min(10),
            irreversibility: self.irreversibility.min(10),
            data_loss: self.data_loss.min(10),
            service_disruption: self.service_disruption.min(10),
            cost_impact: self.cost_impact.min(10),
            inverse_confidence: self.inverse_confidence.min(10),
        }
    }
}

/// Factor weights; must sum to 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub blast_radius: u8,
    pub irreversibility: u8,
    pub data_loss: u8,
    pub service_disruption: u8,
    pub cost_impact: u8,
    pub inverse_confidence: u8,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            blast_radius: 20,
            irreversibility: 20,
            data_loss: 25,
            service_disruption: 25,
            cost_impact: 5,
            inverse_confidence: 5,
        }
    }
}

impl RiskWeights {
    pub fn total(&self) -> u32 {
        [
            self.blast_radius,
            self.irreversibility,
            self.data_loss,
            self.service_disruption,
            self.cost_impact,
            self.inverse_confidence,
        ]
        .iter()
        .map(|w| u32::from(*w))
        .sum()
    }

    pub fn validate(&self) -> SafetyResult<()> {
        match self.total() {
            100 => Ok(()),
            other => Err(SafetyError::InvalidWeights(other)),
        }
    }

    /// Weighted sum scaled to 0-100
    pub fn score(&self, factors: &RiskFactors) -> u8 {
        let f = factors.clamped();
        let sum = u32::from(f.blast_radius) * u32::from(self.blast_radius)
            + u32::from(f.irreversibility) * u32::from(self.irreversibility)
            + u32::from(f.data_loss) * u32::from(self.data_loss)
            + u32::from(f.service_disruption) * u32::from(self.service_disruption)
            + u32::from(f.cost_impact) * u32::from(self.cost_impact)
            + u32::from(f.inverse_confidence) * u32::from(self.inverse_confidence);
        // Round half up; factors top out at 10 so the sum tops out at 1000.
        ((sum + 5) / 10).min(100) as u8
    }
}

/// Inputs that are not part of the action itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskContext {
    /// Resources the action would affect, including the target
    pub blast_radius: usize,
    /// Posterior of the hypothesis behind the action
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub factors: RiskFactors,
    pub score: u8,
    pub band: RiskBand,
    pub estimated_downtime_secs: u64,
    /// Human-readable contributions, largest first
    pub explanation: Vec<String>,
}

impl RiskAssessment {
    pub fn summary(&self) -> String {
        format!(
            "risk {}/100 ({}): {}",
            self.score,
            self.band,
            self.explanation.join("; ")
        )
    }
}

/// Expected unavailability caused by an action
pub fn estimated_downtime_secs(kind: ActionKind) -> u64 {
    match kind {
        ActionKind::Restart => 30,
        ActionKind::Drain => 300,
        ActionKind::Delete => 600,
        ActionKind::RevertRevision | ActionKind::UpdateResources | ActionKind::Patch => 30,
        ActionKind::ApplySnapshot => 30,
        ActionKind::Scale | ActionKind::Cordon => 0,
    }
}

/// Whether an action can destroy stored data
pub fn has_data_loss_potential(action: &ProposedAction) -> bool {
    matches!(action.kind, ActionKind::Delete | ActionKind::Drain)
        && STATEFUL_KINDS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&action.target.kind))
}

fn blast_radius_factor(count: usize) -> u8 {
    match count {
        0 => 0,
        1 => 1,
        2..=3 => 3,
        4..=10 => 5,
        11..=50 => 8,
        _ => 10,
    }
}

fn disruption_factor(downtime_secs: u64) -> u8 {
    match downtime_secs {
        0 => 1,
        1..=60 => 3,
        61..=300 => 7,
        _ => 9,
    }
}

/// Scores proposed actions with a fixed per-action factor table.
///
/// Pure and deterministic: the same action and context always produce the
/// same assessment.
#[derive(Debug, Clone, Default)]
pub struct RiskAssessor {
    weights: RiskWeights,
}

impl RiskAssessor {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    pub fn factors(&self, action: &ProposedAction, ctx: &RiskContext) -> RiskFactors {
        let downtime = estimated_downtime_secs(action.kind);
        let data_loss = has_data_loss_potential(action);

        let (irreversibility, data_loss_factor, cost_impact) = match action.kind {
            ActionKind::Restart => (1, 0, 0),
            ActionKind::Cordon => (1, 0, 0),
            ActionKind::Scale => {
                let delta = match (action.target_replicas(), action.current_replicas()) {
                    (Some(to), Some(from)) => to.abs_diff(from),
                    _ => 1,
                };
                (1, 0, delta.min(10) as u8)
            }
            ActionKind::RevertRevision | ActionKind::ApplySnapshot => (2, 0, 0),
            ActionKind::UpdateResources => (2, 0, 2),
            ActionKind::Patch => (3, 0, 1),
            ActionKind::Drain => (4, if data_loss { 6 } else { 2 }, 1),
            ActionKind::Delete => (10, if data_loss { 10 } else { 6 }, 1),
        };

        let confidence = if ctx.confidence.is_finite() {
            ctx.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        RiskFactors {
            blast_radius: blast_radius_factor(ctx.blast_radius),
            irreversibility,
            data_loss: data_loss_factor,
            service_disruption: disruption_factor(downtime),
            cost_impact,
            inverse_confidence: ((1.0 - confidence) * 10.0).round() as u8,
        }
    }

    pub fn assess(&self, action: &ProposedAction, ctx: &RiskContext) -> RiskAssessment {
        let factors = self.factors(action, ctx);
        self.assess_factors(factors, estimated_downtime_secs(action.kind))
    }

    /// Score precomputed factors
    pub fn assess_factors(&self, factors: RiskFactors, downtime_secs: u64) -> RiskAssessment {
        let factors = factors.clamped();
        let score = self.weights.score(&factors);
        let w = &self.weights;
        let mut parts: Vec<(u32, String)> = vec![
            (u32::from(factors.blast_radius) * u32::from(w.blast_radius), format!("blast radius {}/10", factors.blast_radius)),
            (u32::from(factors.irreversibility) * u32::from(w.irreversibility), format!("irreversibility {}/10", factors.irreversibility)),
            (u32::from(factors.data_loss) * u32::from(w.data_loss), format!("data loss {}/10", factors.data_loss)),
            (u32::from(factors.service_disruption) * u32::from(w.service_disruption), format!("service disruption {}/10", factors.service_disruption)),
            (u32::from(factors.cost_impact) * u32::from(w.cost_impact), format!("cost impact {}/10", factors.cost_impact)),
            (u32::from(factors.inverse_confidence) * u32::from(w.inverse_confidence), format!("uncertainty {}/10", factors.inverse_confidence)),
        ];
        parts.retain(|(weight, _)| *weight > 0);
        parts.sort_by(|a, b| b.0.cmp(&a.0));

        RiskAssessment {
            factors,
            score,
            band: RiskBand::from_score(score),
            estimated_downtime_secs: downtime_secs,
            explanation: parts.into_iter().map(|(_, s)| s).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::ResourceRef;

    fn ctx(blast: usize, confidence: f64) -> RiskContext {
        RiskContext {
            blast_radius: blast,
            confidence,
        }
    }

    #[test]
    fn test_default_weights_sum_to_100() {
        assert!(RiskWeights::default().validate().is_ok());
        let bad = RiskWeights {
            cost_impact: 10,
            ..RiskWeights::default()
        };
        assert_eq!(bad.validate(), Err(SafetyError::InvalidWeights(105)));
    }

    #[test]
    fn test_score_extremes() {
        let w = RiskWeights::default();
        assert_eq!(w.score(&RiskFactors::default()), 0);
        let max = RiskFactors {
            blast_radius: 10,
            irreversibility: 10,
            data_loss: 10,
            service_disruption: 10,
            cost_impact: 10,
            inverse_confidence: 10,
        };
        assert_eq!(w.score(&max), 100);
    }

    #[test]
    fn test_confident_restart_is_auto_executable() {
        let action = ProposedAction::new(
            ActionKind::Restart,
            ResourceRef::namespaced("Deployment", "default", "api"),
        );
        let a = RiskAssessor::default().assess(&action, &ctx(1, 0.91));
        // 1*20 + 1*20 + 0 + 3*25 + 0 + 1*5 = 120 -> 12
        assert_eq!(a.score, 12);
        assert_eq!(a.band, RiskBand::AutoExecutable);
        assert_eq!(a.estimated_downtime_secs, 30);
    }

    #[test]
    fn test_statefulset_delete_is_finding_only() {
        let action = ProposedAction::new(
            ActionKind::Delete,
            ResourceRef::namespaced("StatefulSet", "db", "postgres"),
        );
        assert!(has_data_loss_potential(&action));
        let a = RiskAssessor::default().assess(&action, &ctx(12, 0.6));
        assert_eq!(a.band, RiskBand::FindingOnly);
        assert!(a.explanation[0].starts_with("data loss"));
    }

    #[test]
    fn test_non_finite_confidence_is_maximal_uncertainty() {
        let action = ProposedAction::new(
            ActionKind::Cordon,
            ResourceRef::cluster_scoped("Node", "n1"),
        );
        let f = RiskAssessor::default().factors(&action, &ctx(1, f64::NAN));
        assert_eq!(f.inverse_confidence, 10);
    }
}
