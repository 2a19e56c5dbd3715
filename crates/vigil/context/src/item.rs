//! Context categories, items and intent-specific priority orders

use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_types::IntentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextCategory {
    CurrentState,
    RecentEvents,
    History,
    Topology,
    Metrics,
    Logs,
    Utilization,
    Cost,
    Configuration,
    PeerBenchmarks,
}

impl ContextCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextCategory::CurrentState => "current_state",
            ContextCategory::RecentEvents => "recent_events",
            ContextCategory::History => "history",
            ContextCategory::Topology => "topology",
            ContextCategory::Metrics => "metrics",
            ContextCategory::Logs => "logs",
            ContextCategory::Utilization => "utilization",
            ContextCategory::Cost => "cost",
            ContextCategory::Configuration => "configuration",
            ContextCategory::PeerBenchmarks => "peer_benchmarks",
        }
    }
}

impl fmt::Display for ContextCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories to gather for an intent, highest priority first
pub fn priority_order(intent: IntentType) -> &'static [ContextCategory] {
    use ContextCategory::*;
    match intent {
        IntentType::Diagnosis => &[CurrentState, RecentEvents, History, Topology, Metrics, Logs],
        IntentType::Optimization => &[Utilization, Cost, Configuration, PeerBenchmarks, History],
        IntentType::Prediction => &[Metrics, History, Utilization, CurrentState, RecentEvents],
        IntentType::Planning => &[Configuration, Topology, Utilization, Cost, CurrentState],
        IntentType::Informational => &[CurrentState, Configuration, Topology, RecentEvents],
    }
}

/// Rough token estimate: serialized characters / 4, rounded up
pub fn estimate_tokens(content: &serde_json::Value) -> usize {
    let chars = match content {
        serde_json::Value::String(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    };
    chars.div_ceil(4)
}

/// One entry of a context packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub category: ContextCategory,
    pub label: String,
    pub content: serde_json::Value,
    pub estimated_tokens: usize,
    /// Position of the category in the intent's priority order
    pub rank: usize,
}

impl ContextItem {
    pub fn new(
        category: ContextCategory,
        rank: usize,
        label: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        let estimated_tokens = estimate_tokens(&content);
        Self {
            category,
            label: label.into(),
            content,
            estimated_tokens,
            rank,
        }
    }
}
