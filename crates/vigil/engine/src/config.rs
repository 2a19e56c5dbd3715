//! Engine configuration
//!
//! Every section has documented defaults, so an empty or missing file is a
//! valid configuration.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use vigil_context::ContextConfig;
use vigil_reasoning::ReasoningConfig;
use vigil_safety::{AutonomyPolicy, FieldPolicySpec, RiskWeights, SafetyConfig, SoftGuardrails};

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub budgets: BudgetConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub safety: SafetySection,

    #[serde(default)]
    pub autonomy: AutonomyPolicy,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    #[serde(default)]
    pub tools: ToolConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session-scoped hard stops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    #[serde(default = "default_max_wall_clock_secs")]
    pub max_wall_clock_secs: u64,

    #[serde(default = "default_max_cost_usd")]
    pub max_cost_usd: f64,

    #[serde(default = "default_cost_per_1k_tokens_usd")]
    pub cost_per_1k_tokens_usd: f64,

    /// Extra tool calls granted by a deeper-evidence request
    #[serde(default = "default_deeper_evidence_extension")]
    pub deeper_evidence_extension: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
            max_tokens: default_max_tokens(),
            max_wall_clock_secs: default_max_wall_clock_secs(),
            max_cost_usd: default_max_cost_usd(),
            cost_per_1k_tokens_usd: default_cost_per_1k_tokens_usd(),
            deeper_evidence_extension: default_deeper_evidence_extension(),
        }
    }
}

impl BudgetConfig {
    pub fn wall_clock(&self) -> Duration {
        Duration::from_secs(self.max_wall_clock_secs)
    }
}

/// Guardrail thresholds, field policies and risk weights
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SafetySection {
    #[serde(flatten)]
    pub soft_guardrails: SoftGuardrails,

    #[serde(default)]
    pub risk_weights: RiskWeights,

    #[serde(default)]
    pub policies: Vec<FieldPolicySpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Investigations reasoning or executing at once; more are queued
    #[serde(default = "default_max_concurrent_investigations")]
    pub max_concurrent_investigations: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_investigations: default_max_concurrent_investigations(),
        }
    }
}

/// Retry policy for the tool-invocation interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive retry-exhausted calls before the backend is considered down
    #[serde(default = "default_unavailable_after_failures")]
    pub unavailable_after_failures: u32,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            unavailable_after_failures: default_unavailable_after_failures(),
        }
    }
}

impl ToolConfig {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// How long the post-condition may take to appear
    #[serde(default = "default_verification_window_secs")]
    pub verification_window_secs: u64,

    #[serde(default = "default_verification_poll_secs")]
    pub verification_poll_secs: u64,

    /// Lifetime of a pending approval and of issued approval tokens
    #[serde(default = "default_approval_ttl_secs")]
    pub approval_ttl_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            verification_window_secs: default_verification_window_secs(),
            verification_poll_secs: default_verification_poll_secs(),
            approval_ttl_secs: default_approval_ttl_secs(),
        }
    }
}

impl ExecutionConfig {
    pub fn verification_window(&self) -> Duration {
        Duration::from_secs(self.verification_window_secs)
    }

    pub fn verification_poll(&self) -> Duration {
        Duration::from_secs(self.verification_poll_secs)
    }

    pub fn approval_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.approval_ttl_secs as i64)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_max_tool_calls() -> u32 {
    15
}

fn default_max_tokens() -> u64 {
    50_000
}

fn default_max_wall_clock_secs() -> u64 {
    300
}

fn default_max_cost_usd() -> f64 {
    1.0
}

fn default_cost_per_1k_tokens_usd() -> f64 {
    0.002
}

fn default_deeper_evidence_extension() -> u32 {
    5
}

fn default_max_concurrent_investigations() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_unavailable_after_failures() -> u32 {
    3
}

fn default_verification_window_secs() -> u64 {
    300
}

fn default_verification_poll_secs() -> u64 {
    10
}

fn default_approval_ttl_secs() -> u64 {
    3_600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from a TOML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> EngineResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Safety configuration as the policy store compiles it
    pub fn safety_config(&self) -> SafetyConfig {
        SafetyConfig {
            autonomy: self.autonomy.clone(),
            soft_guardrails: self.safety.soft_guardrails.clone(),
            policies: self.safety.policies.clone(),
            risk_weights: self.safety.risk_weights,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.context.validate()?;
        self.reasoning.validate()?;
        self.safety_config().validate()?;

        let budgets = &self.budgets;
        if budgets.max_tool_calls == 0 {
            return Err(EngineError::Config("budgets.max_tool_calls must be positive".into()));
        }
        if budgets.max_tokens == 0 || budgets.max_wall_clock_secs == 0 {
            return Err(EngineError::Config(
                "budgets.max_tokens and budgets.max_wall_clock_secs must be positive".into(),
            ));
        }
        if budgets.max_cost_usd.is_nan()
            || budgets.max_cost_usd <= 0.0
            || budgets.cost_per_1k_tokens_usd < 0.0 {
            return Err(EngineError::Config(format!(
                "budgets.max_cost_usd must be positive and cost_per_1k_tokens_usd non-negative, got {} and {}",
                budgets.max_cost_usd, budgets.cost_per_1k_tokens_usd
            )));
        }
        if self.concurrency.max_concurrent_investigations == 0 {
            return Err(EngineError::Config(
                "concurrency.max_concurrent_investigations must be at least 1".into(),
            ));
        }
        if self.tools.initial_backoff_ms > self.tools.max_backoff_ms {
            return Err(EngineError::Config(format!(
                "tools.initial_backoff_ms ({}) exceeds tools.max_backoff_ms ({})",
                self.tools.initial_backoff_ms, self.tools.max_backoff_ms
            )));
        }
        if self.tools.unavailable_after_failures == 0 {
            return Err(EngineError::Config(
                "tools.unavailable_after_failures must be at least 1".into(),
            ));
        }
        if self.execution.verification_poll_secs == 0
            || self.execution.verification_poll_secs > self.execution.verification_window_secs
        {
            return Err(EngineError::Config(
                "execution.verification_poll_secs must be within (0, verification_window_secs]"
                    .into(),
            ));
        }
        Ok(())
    }
}
