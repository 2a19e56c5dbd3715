//! Five-level autonomy spectrum

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much the engine may do on its own.
///
/// Levels are totally ordered, so "at least Simulate" is a plain comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Nothing beyond the audit record
    Observe,
    /// Findings only, no recommendations
    Explain,
    /// Recommendations need explicit approval
    Recommend,
    /// A dry-run projection is shown before approval
    Simulate,
    /// Executes directly when risk and guardrails permit
    Act,
}

impl AutonomyLevel {
    pub const ALL: [AutonomyLevel; 5] = [
        AutonomyLevel::Observe,
        AutonomyLevel::Explain,
        AutonomyLevel::Recommend,
        AutonomyLevel::Simulate,
        AutonomyLevel::Act,
    ];

    pub fn at_least(&self, other: AutonomyLevel) -> bool {
        *self >= other
    }

    pub fn emits_findings(&self) -> bool {
        self.at_least(AutonomyLevel::Explain)
    }

    pub fn emits_recommendations(&self) -> bool {
        self.at_least(AutonomyLevel::Recommend)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::Observe => "observe",
            AutonomyLevel::Explain => "explain",
            AutonomyLevel::Recommend => "recommend",
            AutonomyLevel::Simulate => "simulate",
            AutonomyLevel::Act => "act",
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutonomyLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AutonomyLevel::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::AutonomyLevel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(AutonomyLevel::Observe < AutonomyLevel::Explain);
        assert!(AutonomyLevel::Explain < AutonomyLevel::Recommend);
        assert!(AutonomyLevel::Recommend < AutonomyLevel::Simulate);
        assert!(AutonomyLevel::Simulate < AutonomyLevel::Act);
    }

    #[test]
    fn test_at_least() {
        assert!(AutonomyLevel::Act.at_least(AutonomyLevel::Simulate));
        assert!(!AutonomyLevel::Explain.at_least(AutonomyLevel::Recommend));
        assert!(AutonomyLevel::Explain.emits_findings());
        assert!(!AutonomyLevel::Explain.emits_recommendations());
    }

    #[test]
    fn test_parse_roundtrip() {
        for level in AutonomyLevel::ALL {
            assert_eq!(level.to_string().parse::<AutonomyLevel>(), Ok(level));
        }
    }
}
