//! Risk score bands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Band of a 0-100 risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    /// 0-20: may run without a human at the highest autonomy level
    AutoExecutable,
    /// 21-50: explicit approval
    ApprovalRequired,
    /// 51-80: approval plus a written risk explanation
    ApprovalWithExplanation,
    /// 81-100: never executed, surfaced as a finding
    FindingOnly,
}

impl RiskBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=20 => RiskBand::AutoExecutable,
            21..=50 => RiskBand::ApprovalRequired,
            51..=80 => RiskBand::ApprovalWithExplanation,
            _ => RiskBand::FindingOnly,
        }
    }

    pub fn is_executable(&self) -> bool {
        !matches!(self, RiskBand::FindingOnly)
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskBand::AutoExecutable => "auto-executable",
            RiskBand::ApprovalRequired => "approval required",
            RiskBand::ApprovalWithExplanation => "approval with explanation",
            RiskBand::FindingOnly => "finding only",
        };
        f.write_str(s)
    }
}
