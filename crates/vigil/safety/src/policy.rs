//! Versioned copy-on-write safety policy
//!
//! The autonomy matrix, soft guardrails, field policies and risk weights are
//! compiled together into one immutable [`PolicySnapshot`]. Readers take an
//! `Arc` to the current snapshot and keep reasoning against it for the rest
//! of the decision, even if an operator swaps in a new policy meanwhile.

use crate::autonomy::{AutonomyMatrix, AutonomyPolicy};
use crate::error::SafetyResult;
use crate::guardrails::{FieldPolicy, FieldPolicySpec, SoftGuardrails};
use crate::risk::{RiskAssessor, RiskWeights};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Operator-editable safety configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub autonomy: AutonomyPolicy,
    #[serde(default)]
    pub soft_guardrails: SoftGuardrails,
    #[serde(default)]
    pub policies: Vec<FieldPolicySpec>,
    #[serde(default)]
    pub risk_weights: RiskWeights,
}

impl SafetyConfig {
    pub fn validate(&self) -> SafetyResult<()> {
        PolicySnapshot::compile(0, self).map(|_| ())
    }
}

/// One immutable, compiled policy version
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub version: u64,
    pub compiled_at: DateTime<Utc>,
    pub matrix: AutonomyMatrix,
    pub soft_guardrails: SoftGuardrails,
    pub policies: Vec<FieldPolicy>,
    pub risk: RiskAssessor,
    pub source: SafetyConfig,
}

impl PolicySnapshot {
    pub fn compile(version: u64, config: &SafetyConfig) -> SafetyResult<Self> {
        config.risk_weights.validate()?;
        config.soft_guardrails.validate()?;
        let matrix = AutonomyMatrix::compile(&config.autonomy)?;
        let policies = config
            .policies
            .iter()
            .map(FieldPolicy::compile)
            .collect::<SafetyResult<Vec<_>>>()?;
        Ok(Self {
            version,
            compiled_at: Utc::now(),
            matrix,
            soft_guardrails: config.soft_guardrails.clone(),
            policies,
            risk: RiskAssessor::new(config.risk_weights),
            source: config.clone(),
        })
    }
}

/// Holder of the current snapshot; swapped whole, never edited in place
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    pub fn new(config: &SafetyConfig) -> SafetyResult<Self> {
        Ok(Self {
            current: RwLock::new(Arc::new(PolicySnapshot::compile(1, config)?)),
        })
    }

    /// Consistent view for the duration of one decision
    pub fn current(&self) -> Arc<PolicySnapshot> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Recompile from scratch and swap; the old snapshot stays valid for
    /// whoever still holds it.
    pub fn replace(&self, config: &SafetyConfig) -> SafetyResult<Arc<PolicySnapshot>> {
        let mut guard = self.current.write();
        let next = Arc::new(PolicySnapshot::compile(guard.version + 1, config)?);
        *guard = Arc::clone(&next);
        info!(version = next.version, rules = next.matrix.cell_count(), "safety policy replaced");
        Ok(next)
    }
}
