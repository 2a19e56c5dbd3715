//! Prior probabilities from per-resource-kind base rates

use crate::generator::HypothesisProposal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use vigil_types::{FailureMode, Hypothesis, HypothesisId};

/// Rate given to a mode the table has no entry for
const UNLISTED_RATE: f64 = 0.05;

/// Historical frequency of each failure mode, per resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRateTable {
    /// Used when no per-kind history exists
    pub fallback: BTreeMap<FailureMode, f64>,
    #[serde(default)]
    pub by_kind: HashMap<String, BTreeMap<FailureMode, f64>>,
}

impl Default for BaseRateTable {
    fn default() -> Self {
        use FailureMode::*;
        let fallback = BTreeMap::from([
            (ResourceExhaustion, 0.20),
            (ConfigurationError, 0.20),
            (DependencyFailure, 0.15),
            (BadDeployment, 0.20),
            (ApplicationDefect, 0.25),
        ]);
        let workload = BTreeMap::from([
            (ResourceExhaustion, 0.20),
            (BadDeployment, 0.15),
            (ConfigurationError, 0.15),
            (DependencyFailure, 0.10),
            (ApplicationDefect, 0.15),
            (NodePressure, 0.10),
            (NetworkFailure, 0.15),
        ]);
        let node = BTreeMap::from([
            (NodePressure, 0.40),
            (ResourceExhaustion, 0.20),
            (NetworkFailure, 0.20),
            (ConfigurationError, 0.10),
            (DependencyFailure, 0.10),
        ]);

        let mut by_kind = HashMap::new();
        for kind in ["Deployment", "StatefulSet", "DaemonSet", "Pod"] {
            by_kind.insert(kind.to_string(), workload.clone());
        }
        by_kind.insert("Node".to_string(), node);
        Self { fallback, by_kind }
    }
}

impl BaseRateTable {
    pub fn with_kind(mut self, kind: impl Into<String>, rates: BTreeMap<FailureMode, f64>) -> Self {
        self.by_kind.insert(kind.into(), rates);
        self
    }

    pub fn rates_for(&self, kind: Option<&str>) -> &BTreeMap<FailureMode, f64> {
        kind.and_then(|k| self.by_kind.get(k)).unwrap_or(&self.fallback)
    }

    pub fn rate(&self, kind: Option<&str>, mode: FailureMode) -> f64 {
        self.rates_for(kind)
            .get(&mode)
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(UNLISTED_RATE)
    }

    /// Modes worth proposing for a kind, most frequent first
    pub fn likely_modes(&self, kind: Option<&str>) -> Vec<FailureMode> {
        let mut modes: Vec<(FailureMode, f64)> =
            self.rates_for(kind).iter().map(|(m, r)| (*m, *r)).collect();
        modes.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        modes.into_iter().map(|(m, _)| m).collect()
    }

    /// Turn proposals into hypotheses with normalized priors.
    ///
    /// Proposals repeating a failure mode are merged into the first one.
    /// When more than `max` remain, the lowest-prior ones are cut before
    /// normalizing.
    pub fn seed(
        &self,
        kind: Option<&str>,
        proposals: Vec<HypothesisProposal>,
        max: usize,
    ) -> Vec<Hypothesis> {
        let mut seen = Vec::new();
        let mut weighted: Vec<(HypothesisProposal, f64)> = Vec::new();
        for proposal in proposals {
            if seen.contains(&proposal.failure_mode) {
                continue;
            }
            seen.push(proposal.failure_mode);
            let rate = self.rate(kind, proposal.failure_mode);
            weighted.push((proposal, rate));
        }

        if weighted.len() > max {
            debug!(proposed = weighted.len(), max, "truncating hypotheses by prior");
            // Stable sort keeps generator order among equal priors.
            weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
            weighted.truncate(max);
        }

        let total: f64 = weighted.iter().map(|(_, r)| r).sum();
        weighted
            .into_iter()
            .enumerate()
            .map(|(i, (proposal, rate))| {
                Hypothesis::new(
                    HypothesisId(i as u32),
                    proposal.description,
                    proposal.failure_mode,
                    rate / total,
                )
            })
            .collect()
    }
}
