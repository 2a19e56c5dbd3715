//! Hard and soft guardrails plus operator field policies
//!
//! Hard guardrails are code-level constants and cannot be configured away.
//! Soft guardrails are numeric thresholds; tripping one only downgrades an
//! autonomous action to one that needs approval. Field policies let an
//! operator add `field=value` rules that deny or warn.

use crate::error::{SafetyError, SafetyResult};
use crate::ledger::AutonomousActionLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_types::{ActionKind, ProposedAction};

/// Namespaces no action may touch
pub const RESERVED_NAMESPACES: &[&str] = &["kube-system", "kube-public", "kube-node-lease"];

/// Kinds that hold durable data and may never be deleted
pub const DURABLE_STORAGE_KINDS: &[&str] = &[
    "PersistentVolume",
    "PersistentVolumeClaim",
    "VolumeSnapshot",
    "VolumeSnapshotContent",
];

/// Autonomous actions allowed per resource kind per rolling hour
pub const MAX_AUTONOMOUS_ACTIONS_PER_KIND_PER_HOUR: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardGuardrail {
    NamespaceDeletion,
    ReservedNamespace,
    DurableStorageDeletion,
    ScaleToZero,
    AutonomousRateLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftGuardrail {
    MaxScaleDelta,
    MaxConcurrentAutonomous,
    MinConfidence,
    ResourceCooldown,
}

/// Which rule produced a violation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "rule", rename_all = "snake_case")]
pub enum GuardrailRule {
    Hard(HardGuardrail),
    Soft(SoftGuardrail),
    Policy { name: String, effect: PolicyEffect },
}

impl fmt::Display for GuardrailRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardrailRule::Hard(h) => write!(f, "hard:{h:?}"),
            GuardrailRule::Soft(s) => write!(f, "soft:{s:?}"),
            GuardrailRule::Policy { name, .. } => write!(f, "policy:{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailViolation {
    pub rule: GuardrailRule,
    pub message: String,
}

impl GuardrailViolation {
    fn hard(rule: HardGuardrail, message: impl Into<String>) -> Self {
        Self {
            rule: GuardrailRule::Hard(rule),
            message: message.into(),
        }
    }

    fn soft(rule: SoftGuardrail, message: impl Into<String>) -> Self {
        Self {
            rule: GuardrailRule::Soft(rule),
            message: message.into(),
        }
    }

    /// Blocks the action outright rather than requiring approval.
    ///
    /// The autonomous rate limit only stops autonomous execution; a human
    /// may still approve the action.
    pub fn is_blocking(&self) -> bool {
        match &self.rule {
            GuardrailRule::Hard(HardGuardrail::AutonomousRateLimit) => false,
            GuardrailRule::Hard(_) => true,
            GuardrailRule::Soft(_) => false,
            GuardrailRule::Policy { effect, .. } => *effect == PolicyEffect::Deny,
        }
    }
}

impl fmt::Display for GuardrailViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// Fixed code-level predicates
pub struct HardGuardrails;

impl HardGuardrails {
    /// Static hard rules for one action, independent of any score
    pub fn check(action: &ProposedAction) -> Vec<GuardrailViolation> {
        let mut violations = Vec::new();
        let target = &action.target;

        if action.kind == ActionKind::Delete && target.kind.eq_ignore_ascii_case("Namespace") {
            violations.push(GuardrailViolation::hard(
                HardGuardrail::NamespaceDeletion,
                format!("deleting namespace {} is never allowed", target.name),
            ));
        }

        let touched_namespace = if target.kind.eq_ignore_ascii_case("Namespace") {
            Some(target.name.as_str())
        } else {
            target.namespace.as_deref()
        };
        if let Some(ns) = touched_namespace.filter(|ns| RESERVED_NAMESPACES.contains(ns)) {
            violations.push(GuardrailViolation::hard(
                HardGuardrail::ReservedNamespace,
                format!("namespace {ns} is system-reserved"),
            ));
        }

        if action.kind == ActionKind::Delete
            && DURABLE_STORAGE_KINDS
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&target.kind))
        {
            violations.push(GuardrailViolation::hard(
                HardGuardrail::DurableStorageDeletion,
                format!("{} holds durable data and cannot be deleted", target),
            ));
        }

        if action.kind == ActionKind::Scale && action.target_replicas() == Some(0) {
            violations.push(GuardrailViolation::hard(
                HardGuardrail::ScaleToZero,
                format!("{} cannot be scaled to zero replicas", target),
            ));
        }

        violations
    }

    /// Rolling-hour limit on autonomous actions per resource kind
    pub fn check_rate(
        action: &ProposedAction,
        ledger: &AutonomousActionLedger,
        now: DateTime<Utc>,
    ) -> Option<GuardrailViolation> {
        let used = ledger.autonomous_actions_last_hour(&action.target.kind, now);
        (used >= MAX_AUTONOMOUS_ACTIONS_PER_KIND_PER_HOUR).then(|| {
            GuardrailViolation::hard(
                HardGuardrail::AutonomousRateLimit,
                format!(
                    "{used} autonomous actions on {} in the last hour (limit {})",
                    action.target.kind, MAX_AUTONOMOUS_ACTIONS_PER_KIND_PER_HOUR
                ),
            )
        })
    }
}

/// Configurable thresholds for autonomous execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftGuardrails {
    /// Largest replica change an autonomous scale may make
    #[serde(default = "default_max_scale_delta")]
    pub max_scale_delta: u64,

    /// Autonomous executions allowed at once across the engine
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_autonomous_actions: usize,

    /// Minimum hypothesis confidence for autonomous execution
    #[serde(default = "default_min_confidence")]
    pub min_confidence_for_autonomous: f64,

    /// Quiet period after any action on the same resource
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for SoftGuardrails {
    fn default() -> Self {
        Self {
            max_scale_delta: default_max_scale_delta(),
            max_concurrent_autonomous_actions: default_max_concurrent(),
            min_confidence_for_autonomous: default_min_confidence(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_max_scale_delta() -> u64 {
    5
}

fn default_max_concurrent() -> usize {
    2
}

fn default_min_confidence() -> f64 {
    0.8
}

fn default_cooldown_secs() -> u64 {
    600
}

impl SoftGuardrails {
    pub fn validate(&self) -> SafetyResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence_for_autonomous) {
            return Err(SafetyError::InvalidPolicy(format!(
                "min_confidence_for_autonomous {} outside [0, 1]",
                self.min_confidence_for_autonomous
            )));
        }
        Ok(())
    }

    pub fn check(
        &self,
        action: &ProposedAction,
        confidence: f64,
        ledger: &AutonomousActionLedger,
        now: DateTime<Utc>,
    ) -> Vec<GuardrailViolation> {
        let mut violations = Vec::new();

        if action.kind == ActionKind::Scale {
            if let (Some(to), Some(from)) = (action.target_replicas(), action.current_replicas()) {
                let delta = to.abs_diff(from);
                if delta > self.max_scale_delta {
                    violations.push(GuardrailViolation::soft(
                        SoftGuardrail::MaxScaleDelta,
                        format!("scale delta {delta} exceeds {}", self.max_scale_delta),
                    ));
                }
            }
        }

        let in_flight = ledger.in_flight();
        if in_flight >= self.max_concurrent_autonomous_actions {
            violations.push(GuardrailViolation::soft(
                SoftGuardrail::MaxConcurrentAutonomous,
                format!(
                    "{in_flight} autonomous actions already running (limit {})",
                    self.max_concurrent_autonomous_actions
                ),
            ));
        }

        if confidence < self.min_confidence_for_autonomous {
            violations.push(GuardrailViolation::soft(
                SoftGuardrail::MinConfidence,
                format!(
                    "confidence {confidence:.2} below {:.2}",
                    self.min_confidence_for_autonomous
                ),
            ));
        }

        let cooldown = chrono::Duration::seconds(self.cooldown_secs as i64);
        if let Some(remaining) = ledger.cooldown_remaining(&action.target, cooldown, now) {
            violations.push(GuardrailViolation::soft(
                SoftGuardrail::ResourceCooldown,
                format!(
                    "{} acted on recently, {}s of cooldown left",
                    action.target,
                    remaining.num_seconds()
                ),
            ));
        }

        violations
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    Deny,
    Warn,
}

/// Operator policy as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicySpec {
    pub name: String,
    /// Conditions of the form `field=value`, all of which must match
    pub conditions: Vec<String>,
    pub effect: PolicyEffect,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyField {
    Namespace,
    ResourceKind,
    Name,
    Action,
    Category,
}

/// Compiled field policy
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPolicy {
    name: String,
    conditions: Vec<(PolicyField, String)>,
    effect: PolicyEffect,
    description: String,
}

impl FieldPolicy {
    pub fn compile(spec: &FieldPolicySpec) -> SafetyResult<Self> {
        if spec.conditions.is_empty() {
            return Err(SafetyError::InvalidPolicy(format!(
                "policy {} has no conditions",
                spec.name
            )));
        }
        let conditions = spec
            .conditions
            .iter()
            .map(|raw| {
                let (field, value) = raw.split_once('=').ok_or_else(|| {
                    SafetyError::InvalidPolicy(format!("{}: expected field=value, got {raw}", spec.name))
                })?;
                let field = match field.trim() {
                    "namespace" => PolicyField::Namespace,
                    "resource_kind" | "kind" => PolicyField::ResourceKind,
                    "name" => PolicyField::Name,
                    "action" => PolicyField::Action,
                    "category" => PolicyField::Category,
                    other => {
                        return Err(SafetyError::InvalidPolicy(format!(
                            "{}: unknown field {other}",
                            spec.name
                        )))
                    }
                };
                Ok((field, value.trim().to_string()))
            })
            .collect::<SafetyResult<Vec<_>>>()?;
        Ok(Self {
            name: spec.name.clone(),
            conditions,
            effect: spec.effect,
            description: spec.description.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, action: &ProposedAction) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            let actual = match field {
                PolicyField::Namespace => action.target.namespace_or_default(),
                PolicyField::ResourceKind => action.target.kind.as_str(),
                PolicyField::Name => action.target.name.as_str(),
                PolicyField::Action => action.kind.as_str(),
                PolicyField::Category => action.category().as_str(),
            };
            actual.eq_ignore_ascii_case(expected)
        })
    }

    pub fn check(&self, action: &ProposedAction) -> Option<GuardrailViolation> {
        self.matches(action).then(|| GuardrailViolation {
            rule: GuardrailRule::Policy {
                name: self.name.clone(),
                effect: self.effect,
            },
            message: if self.description.is_empty() {
                format!("{} matched {}", self.name, action)
            } else {
                self.description.clone()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::ResourceRef;

    fn deploy(ns: &str) -> ResourceRef {
        ResourceRef::namespaced("Deployment", ns, "api")
    }

    #[test]
    fn test_scale_to_zero_is_blocked() {
        let action = ProposedAction::new(ActionKind::Scale, deploy("default")).with_param("replicas", 0u64);
        let v = HardGuardrails::check(&action);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].rule, GuardrailRule::Hard(HardGuardrail::ScaleToZero));
        assert!(v[0].is_blocking());
    }

    #[test]
    fn test_namespace_delete_is_blocked() {
        let action = ProposedAction::new(
            ActionKind::Delete,
            ResourceRef::cluster_scoped("Namespace", "payments"),
        );
        let v = HardGuardrails::check(&action);
        assert!(v
            .iter()
            .any(|v| v.rule == GuardrailRule::Hard(HardGuardrail::NamespaceDeletion)));
    }

    #[test]
    fn test_reserved_namespace_is_blocked() {
        let action = ProposedAction::new(ActionKind::Restart, deploy("kube-system"));
        let v = HardGuardrails::check(&action);
        assert_eq!(v[0].rule, GuardrailRule::Hard(HardGuardrail::ReservedNamespace));
    }

    #[test]
    fn test_durable_storage_delete_is_blocked() {
        let action = ProposedAction::new(
            ActionKind::Delete,
            ResourceRef::namespaced("PersistentVolumeClaim", "db", "data-0"),
        );
        let v = HardGuardrails::check(&action);
        assert_eq!(
            v[0].rule,
            GuardrailRule::Hard(HardGuardrail::DurableStorageDeletion)
        );
    }

    #[test]
    fn test_restart_in_app_namespace_is_clean() {
        let action = ProposedAction::new(ActionKind::Restart, deploy("default"));
        assert!(HardGuardrails::check(&action).is_empty());
    }

    #[test]
    fn test_soft_guardrails_trip_on_low_confidence_and_delta() {
        let ledger = AutonomousActionLedger::new();
        let soft = SoftGuardrails::default();
        let action = ProposedAction::new(ActionKind::Scale, deploy("default"))
            .with_param("replicas", 12u64)
            .with_param("current_replicas", 3u64);
        let v = soft.check(&action, 0.6, &ledger, Utc::now());
        let rules: Vec<_> = v.iter().map(|v| v.rule.clone()).collect();
        assert!(rules.contains(&GuardrailRule::Soft(SoftGuardrail::MaxScaleDelta)));
        assert!(rules.contains(&GuardrailRule::Soft(SoftGuardrail::MinConfidence)));
        assert!(v.iter().all(|v| !v.is_blocking()));
    }

    #[test]
    fn test_cooldown_trips_after_recent_action() {
        let ledger = AutonomousActionLedger::new();
        let now = Utc::now();
        let target = deploy("default");
        ledger.record_action(&target, now - chrono::Duration::seconds(30));
        let action = ProposedAction::new(ActionKind::Restart, target);
        let v = SoftGuardrails::default().check(&action, 0.95, &ledger, now);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].rule, GuardrailRule::Soft(SoftGuardrail::ResourceCooldown));
    }

    #[test]
    fn test_field_policy_matching() {
        let policy = FieldPolicy::compile(&FieldPolicySpec {
            name: "no-drain-in-payments".into(),
            conditions: vec!["namespace=payments".into(), "action=drain".into()],
            effect: PolicyEffect::Deny,
            description: String::new(),
        })
        .unwrap();
        let drain = ProposedAction::new(ActionKind::Drain, deploy("payments"));
        let restart = ProposedAction::new(ActionKind::Restart, deploy("payments"));
        assert!(policy.check(&drain).unwrap().is_blocking());
        assert!(policy.check(&restart).is_none());
    }

    #[test]
    fn test_field_policy_rejects_bad_condition() {
        let err = FieldPolicy::compile(&FieldPolicySpec {
            name: "bad".into(),
            conditions: vec!["colour=blue".into()],
            effect: PolicyEffect::Warn,
            description: String::new(),
        })
        .unwrap_err();
        assert!(matches!(err, SafetyError::InvalidPolicy(_)));
    }
}
