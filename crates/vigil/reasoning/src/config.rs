//! Reasoning thresholds

use crate::error::{ReasoningError, ReasoningResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Posterior a leader must exceed to stop evidence gathering
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Minimum lead over the runner-up for the separation to count
    #[serde(default = "default_decisive_margin")]
    pub decisive_margin: f64,

    /// Tool calls without separation before switching to discriminating evidence
    #[serde(default = "default_strategy_switch_after")]
    pub strategy_switch_after: u32,

    #[serde(default = "default_max_hypotheses")]
    pub max_hypotheses: usize,

    /// Classifier confidence below which a clarification round is requested
    #[serde(default = "default_intent_confidence_threshold")]
    pub intent_confidence_threshold: f64,

    /// Posterior below which a hypothesis is refuted and stops updating
    #[serde(default = "default_refute_threshold")]
    pub refute_threshold: f64,

    /// Window before the incident in which a change is a plausible cause
    #[serde(default = "default_plausibility_window_hours")]
    pub plausibility_window_hours: i64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            convergence_threshold: default_convergence_threshold(),
            decisive_margin: default_decisive_margin(),
            strategy_switch_after: default_strategy_switch_after(),
            max_hypotheses: default_max_hypotheses(),
            intent_confidence_threshold: default_intent_confidence_threshold(),
            refute_threshold: default_refute_threshold(),
            plausibility_window_hours: default_plausibility_window_hours(),
        }
    }
}

fn default_convergence_threshold() -> f64 {
    0.85
}

fn default_decisive_margin() -> f64 {
    0.5
}

fn default_strategy_switch_after() -> u32 {
    5
}

fn default_max_hypotheses() -> usize {
    7
}

fn default_intent_confidence_threshold() -> f64 {
    0.7
}

fn default_refute_threshold() -> f64 {
    0.05
}

fn default_plausibility_window_hours() -> i64 {
    24
}

impl ReasoningConfig {
    pub fn validate(&self) -> ReasoningResult<()> {
        let unit = [
            ("convergence_threshold", self.convergence_threshold),
            ("decisive_margin", self.decisive_margin),
            ("intent_confidence_threshold", self.intent_confidence_threshold),
            ("refute_threshold", self.refute_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReasoningError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.max_hypotheses == 0 {
            return Err(ReasoningError::InvalidConfig(
                "max_hypotheses must be positive".into(),
            ));
        }
        if self.plausibility_window_hours <= 0 {
            return Err(ReasoningError::InvalidConfig(
                "plausibility_window_hours must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReasoningConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_hypotheses, 7);
        assert_eq!(config.strategy_switch_after, 5);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let config = ReasoningConfig {
            convergence_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
