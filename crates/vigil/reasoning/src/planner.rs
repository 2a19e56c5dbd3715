//! Evidence planning: which tool to call next, and when to stop
//!
//! Starts focused (confirm or refute the current leader first) and switches
//! once to a discriminating strategy when no hypothesis has separated after
//! `strategy_switch_after` calls. When every relevant tool has been asked,
//! a new round starts; the budgets are the hard stop.

use crate::config::ReasoningConfig;
use crate::likelihood::LikelihoodTable;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::{debug, info};
use vigil_types::{FailureMode, Hypothesis, HypothesisId, ResourceRef, Signal};

/// Evidence tools and the signals each one reports
pub const TOOL_CATALOG: &[(&str, &[Signal])] = &[
    (
        "get_pod_status",
        &[Signal::OomKilled, Signal::CrashLoop, Signal::ImagePullFailure],
    ),
    (
        "get_resource_metrics",
        &[Signal::MemoryPressure, Signal::CpuThrottling],
    ),
    ("get_config_history", &[Signal::ConfigChanged]),
    ("get_rollout_history", &[Signal::RecentRollout]),
    (
        "get_node_conditions",
        &[Signal::NodeNotReady, Signal::DiskPressure, Signal::MemoryPressure],
    ),
    (
        "check_dependencies",
        &[Signal::ConnectionRefused, Signal::UpstreamTimeout],
    ),
    ("check_dns", &[Signal::DnsFailure]),
    ("get_error_rates", &[Signal::ErrorRateSpike]),
];

/// Tools that confirm or refute a failure mode, most telling first
pub fn tools_for(mode: FailureMode) -> &'static [&'static str] {
    match mode {
        FailureMode::ResourceExhaustion => &["get_pod_status", "get_resource_metrics"],
        FailureMode::ConfigurationError => &["get_config_history", "get_pod_status"],
        FailureMode::DependencyFailure => &["check_dependencies", "check_dns", "get_error_rates"],
        FailureMode::BadDeployment => &["get_rollout_history", "get_pod_status", "get_error_rates"],
        FailureMode::NodePressure => &["get_node_conditions", "get_resource_metrics"],
        FailureMode::NetworkFailure => &["check_dns", "check_dependencies"],
        FailureMode::ApplicationDefect => &["get_error_rates", "get_pod_status"],
    }
}

pub fn probes(tool: &str) -> &'static [Signal] {
    TOOL_CATALOG
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, signals)| *signals)
        .unwrap_or(&[])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Focused,
    Discriminating,
}

/// One planned tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceQuery {
    pub tool: String,
    pub parameters: Value,
    pub probes: Vec<Signal>,
    /// Hypothesis the query was chosen for
    pub target: HypothesisId,
    pub strategy: Strategy,
}

/// Leader and runner-up posteriors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Separation {
    pub leader: Option<(HypothesisId, f64)>,
    pub runner_up: f64,
}

impl Separation {
    pub fn of(hypotheses: &[Hypothesis]) -> Self {
        let mut ranked: Vec<&Hypothesis> = hypotheses.iter().collect();
        ranked.sort_by(|a, b| b.posterior.total_cmp(&a.posterior).then(a.id.cmp(&b.id)));
        Self {
            leader: ranked.first().map(|h| (h.id, h.posterior)),
            runner_up: ranked.get(1).map(|h| h.posterior).unwrap_or(0.0),
        }
    }

    /// Leader above the convergence threshold and decisively ahead
    pub fn is_decisive(&self, config: &ReasoningConfig) -> bool {
        match self.leader {
            Some((_, p)) => {
                p > config.convergence_threshold && p - self.runner_up >= config.decisive_margin
            }
            None => false,
        }
    }
}

pub fn tool_parameters(target: &ResourceRef) -> Value {
    json!({
        "resource": target.key(),
        "kind": target.kind,
        "namespace": target.namespace,
        "name": target.name,
    })
}

#[derive(Debug, Clone)]
pub struct EvidencePlanner {
    config: ReasoningConfig,
    likelihoods: LikelihoodTable,
    strategy: Strategy,
    issued: BTreeSet<&'static str>,
    round: u32,
}

impl EvidencePlanner {
    pub fn new(config: ReasoningConfig) -> Self {
        Self {
            config,
            likelihoods: LikelihoodTable,
            strategy: Strategy::Focused,
            issued: BTreeSet::new(),
            round: 0,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Switch to discriminating evidence once, after enough calls without
    /// separation. Returns true on the call that switches.
    pub fn maybe_switch(&mut self, calls_made: u32, hypotheses: &[Hypothesis]) -> bool {
        if self.strategy == Strategy::Discriminating
            || calls_made < self.config.strategy_switch_after
            || Separation::of(hypotheses).is_decisive(&self.config)
        {
            return false;
        }
        info!(calls_made, "no hypothesis separated, switching to discriminating evidence");
        self.strategy = Strategy::Discriminating;
        true
    }

    /// Next query, or `None` when no hypothesis is active
    pub fn next(&mut self, hypotheses: &[Hypothesis], target: &ResourceRef) -> Option<EvidenceQuery> {
        let mut active: Vec<&Hypothesis> = hypotheses.iter().filter(|h| h.is_active()).collect();
        if active.is_empty() {
            return None;
        }
        active.sort_by(|a, b| b.posterior.total_cmp(&a.posterior).then(a.id.cmp(&b.id)));

        let pick = self.pick(&active).or_else(|| {
            debug!(round = self.round, "all relevant tools asked, starting a new round");
            self.issued.clear();
            self.round += 1;
            self.pick(&active)
        })?;

        let (tool, hypothesis, strategy) = pick;
        self.issued.insert(tool);
        Some(EvidenceQuery {
            tool: tool.to_string(),
            parameters: tool_parameters(target),
            probes: probes(tool).to_vec(),
            target: hypothesis,
            strategy,
        })
    }

    fn pick(&self, active: &[&Hypothesis]) -> Option<(&'static str, HypothesisId, Strategy)> {
        if self.strategy == Strategy::Discriminating && active.len() >= 2 {
            if let Some(pick) = self.discriminating(active[0], active[1]) {
                return Some(pick);
            }
        }
        active.iter().find_map(|h| {
            tools_for(h.failure_mode)
                .iter()
                .find(|tool| !self.issued.contains(**tool))
                .map(|tool| (*tool, h.id, Strategy::Focused))
        })
    }

    /// Unasked tool whose signals best separate the top two hypotheses
    fn discriminating(
        &self,
        first: &Hypothesis,
        second: &Hypothesis,
    ) -> Option<(&'static str, HypothesisId, Strategy)> {
        let mut best: Option<(&'static str, f64)> = None;
        for (tool, signals) in TOOL_CATALOG {
            if self.issued.contains(*tool) {
                continue;
            }
            let power: f64 = signals
                .iter()
                .map(|s| {
                    self.likelihoods
                        .discrimination(first.failure_mode, second.failure_mode, *s)
                })
                .sum();
            if best.map_or(true, |(_, b)| power > b) {
                best = Some((*tool, power));
            }
        }
        best.filter(|(_, power)| *power > 0.0)
            .map(|(tool, _)| (tool, first.id, Strategy::Discriminating))
    }

    /// Concrete follow-up checks for the leading hypotheses
    pub fn suggestions(&self, hypotheses: &[Hypothesis], target: &ResourceRef, limit: usize) -> Vec<String> {
        let mut ranked: Vec<&Hypothesis> = hypotheses.iter().filter(|h| h.is_active()).collect();
        ranked.sort_by(|a, b| b.posterior.total_cmp(&a.posterior).then(a.id.cmp(&b.id)));

        let mut out = Vec::new();
        for h in ranked.into_iter().take(limit) {
            let tools = tools_for(h.failure_mode);
            let tool = tools
                .iter()
                .find(|t| !self.issued.contains(**t))
                .or_else(|| tools.first());
            if let Some(tool) = tool {
                out.push(format!(
                    "run {tool} on {target} to test {} \"{}\" (currently {:.2})",
                    h.id, h.description, h.posterior
                ));
            }
        }
        out
    }
}
