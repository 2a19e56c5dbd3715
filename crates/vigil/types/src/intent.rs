//! Investigation intent

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the triggering query is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// Why is something broken
    Diagnosis,
    /// How to make something cheaper or leaner
    Optimization,
    /// What will happen next
    Prediction,
    /// How to carry out a planned change
    Planning,
    /// Plain question, no action implied
    Informational,
}

impl IntentType {
    pub const ALL: [IntentType; 5] = [
        IntentType::Diagnosis,
        IntentType::Optimization,
        IntentType::Prediction,
        IntentType::Planning,
        IntentType::Informational,
    ];

    /// Whether a conclusion for this intent can lead to recommendations
    pub fn implies_action(&self) -> bool {
        !matches!(self, IntentType::Informational)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::Diagnosis => "diagnosis",
            IntentType::Optimization => "optimization",
            IntentType::Prediction => "prediction",
            IntentType::Planning => "planning",
            IntentType::Informational => "informational",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntentType::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::IntentType(s.to_string()))
    }
}

/// Result of classifying a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: IntentType,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    /// Runner-up intents with their scores, best first
    #[serde(default)]
    pub alternatives: Vec<(IntentType, f64)>,
}

impl IntentClassification {
    pub fn certain(intent: IntentType) -> Self {
        Self {
            intent,
            confidence: 1.0,
            alternatives: Vec::new(),
        }
    }

    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

/// Raised instead of guessing when the intent is ambiguous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub query: String,
    pub candidates: Vec<IntentType>,
    pub message: String,
}
