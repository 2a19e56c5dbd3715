//! Confidence bands shared by the scorer and reports

use serde::{Deserialize, Serialize};

/// >0.80 high, 0.50..=0.80 moderate, <0.50 low
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Moderate,
    High,
}

impl ConfidenceBand {
    pub const HIGH_THRESHOLD: f64 = 0.80;
    pub const MODERATE_THRESHOLD: f64 = 0.50;

    pub fn from_posterior(p: f64) -> Self {
        if p > Self::HIGH_THRESHOLD {
            ConfidenceBand::High
        } else if p >= Self::MODERATE_THRESHOLD {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceBand::High => "high confidence",
            ConfidenceBand::Moderate => "moderate confidence",
            ConfidenceBand::Low => "low confidence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        assert_eq!(ConfidenceBand::from_posterior(0.81), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::from_posterior(0.80), ConfidenceBand::Moderate);
        assert_eq!(ConfidenceBand::from_posterior(0.50), ConfidenceBand::Moderate);
        assert_eq!(ConfidenceBand::from_posterior(0.49), ConfidenceBand::Low);
    }
}
