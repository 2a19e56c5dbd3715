//! Intent classification boundary

use crate::error::ReasoningResult;
use async_trait::async_trait;
use vigil_types::{ClarificationRequest, IntentClassification, IntentType};

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> ReasoningResult<IntentClassification>;
}

fn keywords(intent: IntentType) -> &'static [&'static str] {
    match intent {
        IntentType::Diagnosis => &[
            "why", "crash", "failing", "failed", "broken", "error", "restart", "down", "root cause",
            "outage", "unhealthy",
        ],
        IntentType::Optimization => &[
            "cost", "cheaper", "reduce", "optimi", "right-size", "rightsize", "waste", "efficien",
            "save",
        ],
        IntentType::Prediction => &["will", "forecast", "predict", "next week", "trend", "run out"],
        IntentType::Planning => &["plan", "migrate", "upgrade", "roll out", "how do i", "how should"],
        IntentType::Informational => &["what is", "show", "list", "which", "how many", "describe"],
    }
}

/// Scores each intent by keyword hits.
///
/// Confidence is the winner's share of all hits, so a query hitting two
/// intents evenly scores 0.5 and triggers a clarification round. A query
/// with no hits scores 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn scores(&self, query: &str) -> Vec<(IntentType, usize)> {
        let query = query.to_lowercase();
        let mut scores: Vec<(IntentType, usize)> = IntentType::ALL
            .into_iter()
            .map(|intent| {
                let n = keywords(intent).iter().filter(|k| query.contains(*k)).count();
                (intent, n)
            })
            .collect();
        // Stable: ties keep declaration order.
        scores.sort_by(|a, b| b.1.cmp(&a.1));
        scores
    }

    pub fn classify_now(&self, query: &str) -> IntentClassification {
        let scores = self.scores(query);
        let total: usize = scores.iter().map(|(_, n)| n).sum();
        let share = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        let (intent, top) = scores[0];
        IntentClassification {
            intent,
            confidence: share(top),
            alternatives: scores[1..]
                .iter()
                .filter(|(_, n)| *n > 0)
                .map(|(i, n)| (*i, share(*n)))
                .collect(),
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, query: &str) -> ReasoningResult<IntentClassification> {
        Ok(self.classify_now(query))
    }
}

/// Clarification round for a classification below threshold
pub fn clarification_for(query: &str, classification: &IntentClassification) -> ClarificationRequest {
    let mut candidates = Vec::new();
    if classification.confidence > 0.0 {
        candidates.push(classification.intent);
        candidates.extend(classification.alternatives.iter().map(|(i, _)| *i));
    } else {
        candidates.extend(IntentType::ALL);
    }
    let names: Vec<&str> = candidates.iter().map(IntentType::as_str).collect();
    ClarificationRequest {
        query: query.to_string(),
        message: format!(
            "The request could mean several things ({}). Which kind of answer do you want?",
            names.join(", ")
        ),
        candidates,
    }
}
