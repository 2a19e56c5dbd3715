//! Confidence scoring: bands, co-equal findings and inconclusive outcomes

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::info;
use vigil_types::{
    ConfidenceBand, Evidence, EvidenceId, Finding, Hypothesis, HypothesisId, HypothesisStatus,
};

/// Findings this close together (and both above 0.5) are co-equal
pub const CO_EQUAL_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    /// At least one hypothesis above 0.50
    Resolved,
    /// Nothing above 0.50; next steps instead of a guess
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scoring {
    pub conclusion: Conclusion,
    /// Ranked hypothesis findings followed by the evidence facts behind them
    pub findings: Vec<Finding>,
    /// Hypotheses recommendations may be built on, best first
    pub confirmed: Vec<HypothesisId>,
    pub next_steps: Vec<String>,
}

/// Ordering used everywhere a hypothesis ranking is reported: posterior,
/// then supporting-evidence count, then id
pub fn compare(a: &Hypothesis, b: &Hypothesis) -> Ordering {
    b.posterior
        .total_cmp(&a.posterior)
        .then(b.supporting_evidence.cmp(&a.supporting_evidence))
        .then(a.id.cmp(&b.id))
}

fn supporting(evidence: &[Evidence], hypothesis: HypothesisId) -> Vec<EvidenceId> {
    evidence
        .iter()
        .filter(|e| e.contribution_for(hypothesis).is_some_and(|c| c.supports()))
        .map(|e| e.id)
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// Freeze posteriors into findings.
    ///
    /// Marks the confirmed hypotheses. `suggestions` are concrete follow-up
    /// checks, attached when the outcome is inconclusive or only moderate.
    pub fn score(
        &self,
        hypotheses: &mut [Hypothesis],
        evidence: &[Evidence],
        suggestions: Vec<String>,
    ) -> Scoring {
        let mut ranked: Vec<Hypothesis> = hypotheses.to_vec();
        ranked.sort_by(compare);

        let co_equal = |h: &Hypothesis| {
            h.posterior > ConfidenceBand::MODERATE_THRESHOLD
                && ranked.iter().any(|o| {
                    o.id != h.id
                        && o.posterior > ConfidenceBand::MODERATE_THRESHOLD
                        && (o.posterior - h.posterior).abs() <= CO_EQUAL_MARGIN
                })
        };

        let mut findings = Vec::new();
        for h in &ranked {
            let band = ConfidenceBand::from_posterior(h.posterior);
            let caveat = match band {
                ConfidenceBand::High => "",
                ConfidenceBand::Moderate => ", reported with caveats",
                ConfidenceBand::Low => ", mentioned only",
            };
            findings.push(Finding {
                summary: format!(
                    "{} {}: {:.2} ({}{caveat})",
                    h.id,
                    h.description,
                    h.posterior,
                    band.label()
                ),
                hypothesis: Some(h.id),
                posterior: Some(h.posterior),
                band: Some(band),
                co_equal: co_equal(h),
                evidence: supporting(evidence, h.id),
            });
        }

        let high: Vec<HypothesisId> = ranked
            .iter()
            .filter(|h| ConfidenceBand::from_posterior(h.posterior) == ConfidenceBand::High)
            .map(|h| h.id)
            .collect();
        let confirmed = if !high.is_empty() {
            high
        } else {
            match ranked.first() {
                Some(leader) if leader.posterior > ConfidenceBand::MODERATE_THRESHOLD => ranked
                    .iter()
                    .filter(|h| {
                        h.id == leader.id
                            || (co_equal(h) && (leader.posterior - h.posterior) <= CO_EQUAL_MARGIN)
                    })
                    .map(|h| h.id)
                    .collect(),
                _ => Vec::new(),
            }
        };

        for h in hypotheses.iter_mut() {
            if confirmed.contains(&h.id) {
                h.status = HypothesisStatus::Confirmed;
            }
        }

        findings.extend(
            evidence
                .iter()
                .filter(|e| e.contributions.iter().any(|c| c.weight != 0.0))
                .map(|e| Finding::fact(e.finding.clone(), vec![e.id])),
        );

        let leader_band = ranked
            .first()
            .map(|h| ConfidenceBand::from_posterior(h.posterior))
            .unwrap_or(ConfidenceBand::Low);
        let conclusion = if confirmed.is_empty() {
            Conclusion::Inconclusive
        } else {
            Conclusion::Resolved
        };

        let mut next_steps = Vec::new();
        if conclusion == Conclusion::Inconclusive || leader_band == ConfidenceBand::Moderate {
            next_steps.extend(suggestions);
        }
        if conclusion == Conclusion::Inconclusive {
            next_steps.push(
                "request deeper evidence to extend the tool-call budget for this investigation"
                    .to_string(),
            );
        }

        info!(
            conclusion = ?conclusion,
            confirmed = confirmed.len(),
            hypotheses = ranked.len(),
            "confidence scored"
        );
        Scoring {
            conclusion,
            findings,
            confirmed,
            next_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::FailureMode;

    fn hs(posteriors: &[f64]) -> Vec<Hypothesis> {
        posteriors
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut h = Hypothesis::new(
                    HypothesisId(i as u32),
                    format!("cause {i}"),
                    FailureMode::ALL[i],
                    *p,
                );
                h.posterior = *p;
                h
            })
            .collect()
    }

    #[test]
    fn test_high_confidence_primary() {
        let mut h = hs(&[0.04, 0.91, 0.05]);
        let s = ConfidenceScorer.score(&mut h, &[], vec!["x".into()]);
        assert_eq!(s.conclusion, Conclusion::Resolved);
        assert_eq!(s.confirmed, vec![HypothesisId(1)]);
        assert_eq!(s.findings[0].label(), "high confidence");
        assert_eq!(h[1].status, HypothesisStatus::Confirmed);
        assert!(s.next_steps.is_empty());
    }

    #[test]
    fn test_co_equal_moderate_findings() {
        let mut h = hs(&[0.52, 0.48, 0.0]);
        h[1].posterior = 0.54;
        let s = ConfidenceScorer.score(&mut h, &[], vec!["check more".into()]);
        assert!(s.findings[0].co_equal && s.findings[1].co_equal);
        assert_eq!(s.confirmed, vec![HypothesisId(1), HypothesisId(0)]);
        assert_eq!(s.findings[0].label(), "moderate confidence");
        assert_eq!(s.next_steps, vec!["check more".to_string()]);
    }

    #[test]
    fn test_two_high_not_co_equal_both_reported_ranked() {
        let mut h = hs(&[0.81, 0.9, 0.0]);
        h[0].supporting_evidence = 4;
        let s = ConfidenceScorer.score(&mut h, &[], Vec::new());
        assert_eq!(s.confirmed, vec![HypothesisId(1), HypothesisId(0)]);
        assert!(!s.findings[0].co_equal);
    }

    #[test]
    fn test_inconclusive_has_next_steps() {
        let mut h = hs(&[0.3, 0.35, 0.35]);
        let s = ConfidenceScorer.score(&mut h, &[], vec!["run get_error_rates".into()]);
        assert_eq!(s.conclusion, Conclusion::Inconclusive);
        assert!(s.confirmed.is_empty());
        assert_eq!(s.next_steps.len(), 2);
        assert!(h.iter().all(|h| h.status == HypothesisStatus::Active));
    }

    #[test]
    fn test_ties_broken_by_evidence_count() {
        let mut a = hs(&[0.45, 0.45]);
        a[1].supporting_evidence = 2;
        a.sort_by(compare);
        assert_eq!(a[0].id, HypothesisId(1));
    }
}
