//! Bayesian updating over the active hypothesis set
//!
//! Pure and deterministic: replaying the recorded contributions of every
//! evidence item through [`apply`] reproduces the live posteriors exactly.

use tracing::trace;
use vigil_types::{Evidence, Hypothesis, HypothesisId, HypothesisStatus, LikelihoodContribution};

/// Changes smaller than this count as neither support nor refutation
const NEUTRAL_EPSILON: f64 = 1e-12;

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// `posterior_i = prior_i * L_i / sum_j(prior_j * L_j)`, scaled to the
/// probability mass the priors carried.
///
/// If the evidence has zero probability under every hypothesis the priors
/// are returned unchanged.
pub fn update(priors: &[f64], likelihoods: &[f64]) -> Vec<f64> {
    let priors: Vec<f64> = priors.iter().copied().map(unit).collect();
    let mass: f64 = priors.iter().sum();
    let joint: Vec<f64> = priors
        .iter()
        .zip(likelihoods.iter().copied().map(unit).chain(std::iter::repeat(1.0)))
        .map(|(p, l)| p * l)
        .collect();
    let marginal: f64 = joint.iter().sum();
    if !(marginal.is_finite() && marginal > 0.0) {
        return priors;
    }
    joint.into_iter().map(|j| unit(j / marginal * mass)).collect()
}

/// Halve the gain of implausible updates.
///
/// The halved entries keep exactly half their gain; the mass they give up
/// goes to the remaining hypotheses in proportion to their values.
pub fn discount(before: &[f64], after: &[f64], plausible: &[bool]) -> Vec<f64> {
    let mut adjusted = after.to_vec();
    let mut halved = vec![false; after.len()];
    let mut freed = 0.0;
    for (i, ((b, a), ok)) in before
        .iter()
        .zip(after)
        .zip(plausible.iter().copied().chain(std::iter::repeat(true)))
        .enumerate()
    {
        let delta = a - b;
        if !ok && delta > 0.0 {
            adjusted[i] = b + delta / 2.0;
            halved[i] = true;
            freed += delta / 2.0;
        }
    }
    let others: f64 = adjusted
        .iter()
        .zip(&halved)
        .filter(|(_, h)| !**h)
        .map(|(x, _)| *x)
        .sum();
    if freed > 0.0 && others.is_finite() && others > 0.0 {
        let scale = 1.0 + freed / others;
        for (x, h) in adjusted.iter_mut().zip(&halved) {
            if !*h {
                *x *= scale;
            }
        }
    }
    adjusted.into_iter().map(unit).collect()
}

/// Per-hypothesis input for one evidence item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateInput {
    pub hypothesis: HypothesisId,
    pub likelihood: f64,
    pub plausible: bool,
}

/// Apply one evidence item to every active hypothesis that has an input.
///
/// Hypotheses falling below `refute_threshold` are marked refuted and stop
/// updating.
pub fn apply(
    hypotheses: &mut [Hypothesis],
    inputs: &[UpdateInput],
    refute_threshold: f64,
) -> Vec<LikelihoodContribution> {
    let targets: Vec<(usize, UpdateInput)> = hypotheses
        .iter()
        .enumerate()
        .filter(|(_, h)| h.is_active())
        .filter_map(|(i, h)| {
            inputs
                .iter()
                .find(|input| input.hypothesis == h.id)
                .map(|input| (i, *input))
        })
        .collect();
    if targets.is_empty() {
        return Vec::new();
    }

    let before: Vec<f64> = targets.iter().map(|(i, _)| hypotheses[*i].posterior).collect();
    let likelihoods: Vec<f64> = targets.iter().map(|(_, input)| input.likelihood).collect();
    let plausible: Vec<bool> = targets.iter().map(|(_, input)| input.plausible).collect();
    let after = discount(&before, &update(&before, &likelihoods), &plausible);

    let mut contributions = Vec::with_capacity(targets.len());
    for (((index, input), old), new) in targets.into_iter().zip(before).zip(after) {
        let hypothesis = &mut hypotheses[index];
        let weight = new - old;
        hypothesis.posterior = new;
        if weight > NEUTRAL_EPSILON {
            hypothesis.supporting_evidence += 1;
        } else if weight < -NEUTRAL_EPSILON {
            hypothesis.refuting_evidence += 1;
        }
        if new < refute_threshold {
            trace!(hypothesis = %hypothesis.id, posterior = new, "hypothesis refuted");
            hypothesis.status = HypothesisStatus::Refuted;
        }
        contributions.push(LikelihoodContribution {
            hypothesis: input.hypothesis,
            likelihood: unit(input.likelihood),
            plausible: input.plausible,
            weight,
        });
    }
    contributions
}

/// Recompute posteriors from priors and recorded evidence contributions
pub fn replay_posteriors(
    hypotheses: &[Hypothesis],
    evidence: &[Evidence],
    refute_threshold: f64,
) -> Vec<Hypothesis> {
    let mut replayed: Vec<Hypothesis> = hypotheses
        .iter()
        .map(|h| Hypothesis::new(h.id, h.description.clone(), h.failure_mode, h.prior))
        .collect();
    for item in evidence {
        let inputs: Vec<UpdateInput> = item
            .contributions
            .iter()
            .map(|c| UpdateInput {
                hypothesis: c.hypothesis,
                likelihood: c.likelihood,
                plausible: c.plausible,
            })
            .collect();
        apply(&mut replayed, &inputs, refute_threshold);
    }
    replayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_types::{EvidenceId, FailureMode};

    fn hypotheses(priors: &[f64]) -> Vec<Hypothesis> {
        priors
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Hypothesis::new(
                    HypothesisId(i as u32),
                    format!("h{i}"),
                    FailureMode::ALL[i],
                    *p,
                )
            })
            .collect()
    }

    fn inputs(likelihoods: &[f64]) -> Vec<UpdateInput> {
        likelihoods
            .iter()
            .enumerate()
            .map(|(i, l)| UpdateInput {
                hypothesis: HypothesisId(i as u32),
                likelihood: *l,
                plausible: true,
            })
            .collect()
    }

    #[test]
    fn test_two_step_convergence() {
        let mut hs = hypotheses(&[0.4, 0.3, 0.3]);
        apply(&mut hs, &inputs(&[0.9, 0.15, 0.1]), 0.05);
        assert!(hs[0].posterior > 0.82 && hs[0].posterior < 0.85);
        apply(&mut hs, &inputs(&[0.85, 0.2, 0.15]), 0.05);
        assert!(hs[0].posterior > 0.95);
        assert_eq!(hs[0].supporting_evidence, 2);
        let total: f64 = hs.iter().map(|h| h.posterior).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_marginal_keeps_priors() {
        assert_eq!(update(&[0.5, 0.5], &[0.0, 0.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn test_neutral_evidence_changes_nothing() {
        let mut hs = hypotheses(&[0.5, 0.5]);
        let contributions = apply(&mut hs, &inputs(&[0.3, 0.3]), 0.05);
        assert_eq!(hs[0].posterior, 0.5);
        assert_eq!(hs[0].evidence_count(), 0);
        assert!(!contributions[0].supports());
    }

    #[test]
    fn test_implausible_gain_is_halved() {
        let before = [0.5, 0.5];
        let after = update(&before, &[0.9, 0.1]);
        let discounted = discount(&before, &after, &[false, true]);
        assert!((after[0] - 0.9).abs() < 1e-9);
        assert!((discounted[0] - 0.7).abs() < 1e-9);
        assert!((discounted[0] - before[0] - (after[0] - before[0]) / 2.0).abs() < 1e-9);
        assert!((discounted[1] - 0.3).abs() < 1e-9);
        assert!((discounted.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_freed_mass_goes_to_others_proportionally() {
        let before = [0.4, 0.3, 0.3];
        let after = update(&before, &[0.9, 0.5, 0.1]);
        let discounted = discount(&before, &after, &[false, true, true]);
        let gain = after[0] - before[0];
        assert!((discounted[0] - (before[0] + gain / 2.0)).abs() < 1e-9);
        let ratio_after = after[1] / after[2];
        let ratio_discounted = discounted[1] / discounted[2];
        assert!((ratio_after - ratio_discounted).abs() < 1e-9);
        assert!((discounted.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_plausible_updates_untouched() {
        let before = [0.5, 0.5];
        let after = update(&before, &[0.9, 0.1]);
        assert_eq!(discount(&before, &after, &[true, true]), after);
    }

    #[test]
    fn test_refuted_hypotheses_freeze() {
        let mut hs = hypotheses(&[0.5, 0.5]);
        apply(&mut hs, &inputs(&[0.99, 0.01]), 0.05);
        assert_eq!(hs[1].status, HypothesisStatus::Refuted);
        let frozen = hs[1].posterior;
        let contributions = apply(&mut hs, &inputs(&[0.1, 0.9]), 0.05);
        assert_eq!(hs[1].posterior, frozen);
        assert_eq!(contributions.len(), 1);
    }

    #[test]
    fn test_replay_reproduces_live_scores() {
        let mut live = hypotheses(&[0.2, 0.3, 0.5]);
        let steps = [
            (vec![0.7, 0.2, 0.4], vec![true, true, true]),
            (vec![0.6, 0.9, 0.3], vec![true, false, true]),
            (vec![0.8, 0.5, 0.05], vec![true, true, true]),
        ];
        let mut evidence = Vec::new();
        for (n, (ls, ok)) in steps.iter().enumerate() {
            let step_inputs: Vec<UpdateInput> = inputs(ls)
                .into_iter()
                .zip(ok)
                .map(|(i, ok)| UpdateInput { plausible: *ok, ..i })
                .collect();
            let contributions = apply(&mut live, &step_inputs, 0.05);
            evidence.push(Evidence {
                id: EvidenceId(n as u32),
                tool: "t".into(),
                parameters: serde_json::Value::Null,
                result: serde_json::Value::Null,
                finding: String::new(),
                observations: Vec::new(),
                contributions,
                change_at: None,
                latency_ms: 0,
                cache_hit: false,
                observed_at: Utc::now(),
            });
        }
        let replayed = replay_posteriors(&live, &evidence, 0.05);
        for (a, b) in live.iter().zip(&replayed) {
            assert_eq!(a.posterior, b.posterior);
            assert_eq!(a.status, b.status);
        }
    }
}
