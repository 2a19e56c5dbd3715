//! Candidate causal explanations

use crate::error::ParseError;
use crate::ids::HypothesisId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Failure family a hypothesis belongs to.
///
/// Base rates, likelihoods, evidence queries and remediations are all keyed
/// on the failure mode, so the language-model boundary only has to supply
/// text and a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    ResourceExhaustion,
    ConfigurationError,
    DependencyFailure,
    BadDeployment,
    NodePressure,
    NetworkFailure,
    ApplicationDefect,
}

impl FailureMode {
    pub const ALL: [FailureMode; 7] = [
        FailureMode::ResourceExhaustion,
        FailureMode::ConfigurationError,
        FailureMode::DependencyFailure,
        FailureMode::BadDeployment,
        FailureMode::NodePressure,
        FailureMode::NetworkFailure,
        FailureMode::ApplicationDefect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::ResourceExhaustion => "resource_exhaustion",
            FailureMode::ConfigurationError => "configuration_error",
            FailureMode::DependencyFailure => "dependency_failure",
            FailureMode::BadDeployment => "bad_deployment",
            FailureMode::NodePressure => "node_pressure",
            FailureMode::NetworkFailure => "network_failure",
            FailureMode::ApplicationDefect => "application_defect",
        }
    }

    /// Modes whose plausibility depends on a recent change
    pub fn is_change_driven(&self) -> bool {
        matches!(
            self,
            FailureMode::BadDeployment | FailureMode::ConfigurationError
        )
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::FailureMode(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    Active,
    Confirmed,
    Refuted,
}

/// A candidate explanation with its probability estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: HypothesisId,
    pub description: String,
    pub failure_mode: FailureMode,
    pub prior: f64,
    pub posterior: f64,
    pub status: HypothesisStatus,
    /// Evidence items that raised this hypothesis
    pub supporting_evidence: u32,
    /// Evidence items that lowered this hypothesis
    pub refuting_evidence: u32,
}

impl Hypothesis {
    pub fn new(
        id: HypothesisId,
        description: impl Into<String>,
        failure_mode: FailureMode,
        prior: f64,
    ) -> Self {
        let prior = prior.clamp(0.0, 1.0);
        Self {
            id,
            description: description.into(),
            failure_mode,
            prior,
            posterior: prior,
            status: HypothesisStatus::Active,
            supporting_evidence: 0,
            refuting_evidence: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == HypothesisStatus::Active
    }

    pub fn evidence_count(&self) -> u32 {
        self.supporting_evidence + self.refuting_evidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_hypothesis_starts_at_prior() {
        let h = Hypothesis::new(HypothesisId(0), "oom", FailureMode::ResourceExhaustion, 0.4);
        assert_eq!(h.posterior, 0.4);
        assert!(h.is_active());
        assert_eq!(h.evidence_count(), 0);
    }

    #[test]
    fn test_prior_is_clamped() {
        let h = Hypothesis::new(HypothesisId(0), "x", FailureMode::NetworkFailure, 1.7);
        assert_eq!(h.prior, 1.0);
    }

    #[test]
    fn test_change_driven_modes() {
        assert!(FailureMode::BadDeployment.is_change_driven());
        assert!(!FailureMode::NodePressure.is_change_driven());
    }
}
