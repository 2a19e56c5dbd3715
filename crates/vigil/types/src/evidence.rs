//! Evidence gathered through tool calls and the findings derived from it

use crate::confidence::ConfidenceBand;
use crate::error::ParseError;
use crate::ids::{EvidenceId, HypothesisId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observable symptom a tool result can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    OomKilled,
    MemoryPressure,
    CpuThrottling,
    CrashLoop,
    ImagePullFailure,
    ConfigChanged,
    RecentRollout,
    NodeNotReady,
    DiskPressure,
    DnsFailure,
    ConnectionRefused,
    UpstreamTimeout,
    ErrorRateSpike,
}

impl Signal {
    pub const ALL: [Signal; 13] = [
        Signal::OomKilled,
        Signal::MemoryPressure,
        Signal::CpuThrottling,
        Signal::CrashLoop,
        Signal::ImagePullFailure,
        Signal::ConfigChanged,
        Signal::RecentRollout,
        Signal::NodeNotReady,
        Signal::DiskPressure,
        Signal::DnsFailure,
        Signal::ConnectionRefused,
        Signal::UpstreamTimeout,
        Signal::ErrorRateSpike,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::OomKilled => "oom_killed",
            Signal::MemoryPressure => "memory_pressure",
            Signal::CpuThrottling => "cpu_throttling",
            Signal::CrashLoop => "crash_loop",
            Signal::ImagePullFailure => "image_pull_failure",
            Signal::ConfigChanged => "config_changed",
            Signal::RecentRollout => "recent_rollout",
            Signal::NodeNotReady => "node_not_ready",
            Signal::DiskPressure => "disk_pressure",
            Signal::DnsFailure => "dns_failure",
            Signal::ConnectionRefused => "connection_refused",
            Signal::UpstreamTimeout => "upstream_timeout",
            Signal::ErrorRateSpike => "error_rate_spike",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::ALL
            .into_iter()
            .find(|sig| sig.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::Signal(s.to_string()))
    }
}

/// Presence or absence of one signal in a tool result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub signal: Signal,
    pub present: bool,
}

impl Observation {
    pub fn present(signal: Signal) -> Self {
        Self {
            signal,
            present: true,
        }
    }

    pub fn absent(signal: Signal) -> Self {
        Self {
            signal,
            present: false,
        }
    }
}

/// Effect of one evidence item on one hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodContribution {
    pub hypothesis: HypothesisId,
    /// P(evidence | hypothesis) from the likelihood table
    pub likelihood: f64,
    /// False when the causal-plausibility check halved this contribution
    pub plausible: bool,
    /// Posterior change this evidence caused (positive supports, negative refutes)
    pub weight: f64,
}

impl LikelihoodContribution {
    pub fn supports(&self) -> bool {
        self.weight > 0.0
    }
}

/// A single immutable observation obtained via a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub tool: String,
    pub parameters: serde_json::Value,
    pub result: serde_json::Value,
    pub finding: String,
    pub observations: Vec<Observation>,
    pub contributions: Vec<LikelihoodContribution>,
    /// When the change the result reports happened, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_at: Option<DateTime<Utc>>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub observed_at: DateTime<Utc>,
}

impl Evidence {
    pub fn contribution_for(&self, hypothesis: HypothesisId) -> Option<&LikelihoodContribution> {
        self.contributions.iter().find(|c| c.hypothesis == hypothesis)
    }
}

/// Compressed human-readable fact derived from evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<HypothesisId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posterior: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<ConfidenceBand>,
    /// Reported alongside another finding of equal standing
    #[serde(default)]
    pub co_equal: bool,
    #[serde(default)]
    pub evidence: Vec<EvidenceId>,
}

impl Finding {
    pub fn fact(summary: impl Into<String>, evidence: Vec<EvidenceId>) -> Self {
        Self {
            summary: summary.into(),
            hypothesis: None,
            posterior: None,
            band: None,
            co_equal: false,
            evidence,
        }
    }

    /// Label such as "high confidence", empty for plain facts
    pub fn label(&self) -> &'static str {
        self.band.map(|b| b.label()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_parse_roundtrip() {
        for s in Signal::ALL {
            assert_eq!(s.as_str().parse::<Signal>(), Ok(s));
        }
    }

    #[test]
    fn test_contribution_lookup() {
        let ev = Evidence {
            id: EvidenceId(0),
            tool: "get_events".into(),
            parameters: serde_json::Value::Null,
            result: serde_json::Value::Null,
            finding: "OOMKilled x3".into(),
            observations: vec![Observation::present(Signal::OomKilled)],
            contributions: vec![LikelihoodContribution {
                hypothesis: HypothesisId(1),
                likelihood: 0.9,
                plausible: true,
                weight: 0.2,
            }],
            change_at: None,
            latency_ms: 12,
            cache_hit: false,
            observed_at: Utc::now(),
        };
        assert!(ev.contribution_for(HypothesisId(1)).unwrap().supports());
        assert!(ev.contribution_for(HypothesisId(0)).is_none());
    }
}
