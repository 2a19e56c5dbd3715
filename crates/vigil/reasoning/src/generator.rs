//! Hypothesis generation boundary
//!
//! Generators return structured hypothesis text and a failure mode, never
//! probabilities: priors come from the base-rate table so that scores stay
//! reproducible whatever backend wrote the text.

use crate::error::ReasoningResult;
use crate::priors::BaseRateTable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_context::ContextPacket;
use vigil_types::{FailureMode, IntentType, ResourceRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisProposal {
    pub description: String,
    pub failure_mode: FailureMode,
}

impl HypothesisProposal {
    pub fn new(description: impl Into<String>, failure_mode: FailureMode) -> Self {
        Self {
            description: description.into(),
            failure_mode,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub query: &'a str,
    pub intent: IntentType,
    pub target: Option<&'a ResourceRef>,
    pub context: &'a ContextPacket,
}

#[async_trait]
pub trait HypothesisGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> ReasoningResult<Vec<HypothesisProposal>>;
}

fn template(mode: FailureMode) -> &'static str {
    match mode {
        FailureMode::ResourceExhaustion => "memory or CPU limits too low for current load",
        FailureMode::ConfigurationError => "a recent configuration change is invalid",
        FailureMode::DependencyFailure => "an upstream dependency is failing or unreachable",
        FailureMode::BadDeployment => "the latest rollout introduced a faulty revision",
        FailureMode::NodePressure => "the hosting node is under resource pressure",
        FailureMode::NetworkFailure => "DNS or network connectivity is degraded",
        FailureMode::ApplicationDefect => "an application defect is triggered by current traffic",
    }
}

fn keywords(mode: FailureMode) -> &'static [&'static str] {
    match mode {
        FailureMode::ResourceExhaustion => &["oom", "memory", "throttl", "limit"],
        FailureMode::ConfigurationError => &["config", "secret", "env var"],
        FailureMode::DependencyFailure => &["connection refused", "upstream", "dependency", "timeout"],
        FailureMode::BadDeployment => &["rollout", "deploy", "revision", "imagepull"],
        FailureMode::NodePressure => &["node", "diskpressure", "notready", "evict"],
        FailureMode::NetworkFailure => &["dns", "network", "unreachable"],
        FailureMode::ApplicationDefect => &["exception", "panic", "error rate", "5xx", "stack trace"],
    }
}

/// Deterministic generator driven by keywords in the query and context.
///
/// Modes with keyword hits come first, most hits first; the resource kind's
/// base-rate modes fill the rest. Used offline and as the default when no
/// language-model backend is configured.
#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator {
    base_rates: BaseRateTable,
}

impl TemplateGenerator {
    pub fn new(base_rates: BaseRateTable) -> Self {
        Self { base_rates }
    }

    pub fn propose(&self, request: &GenerationRequest<'_>) -> Vec<HypothesisProposal> {
        let mut haystack = request.query.to_lowercase();
        for item in request.context.items() {
            haystack.push(' ');
            haystack.push_str(&item.content.to_string().to_lowercase());
        }

        let mut hits: Vec<(FailureMode, usize)> = FailureMode::ALL
            .into_iter()
            .map(|mode| {
                let n = keywords(mode)
                    .iter()
                    .map(|k| haystack.matches(k).count())
                    .sum();
                (mode, n)
            })
            .filter(|(_, n)| *n > 0)
            .collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut modes: Vec<FailureMode> = hits.into_iter().map(|(m, _)| m).collect();
        for mode in self.base_rates.likely_modes(request.target.map(|t| t.kind.as_str())) {
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        modes
            .into_iter()
            .map(|mode| HypothesisProposal::new(template(mode), mode))
            .collect()
    }
}

#[async_trait]
impl HypothesisGenerator for TemplateGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> ReasoningResult<Vec<HypothesisProposal>> {
        Ok(self.propose(request))
    }
}
