//! Vigil safety layer
//!
//! Decides what may happen to a recommendation once reasoning is done:
//!
//! 1. Hard guardrails ([`HardGuardrails`]) and deny-effect field policies
//!    block unconditionally, whatever the risk score.
//! 2. The risk score ([`RiskAssessor`]) bands the action: 81-100 is only
//!    ever a finding.
//! 3. The autonomy matrix ([`AutonomyMatrix`]) picks the level for
//!    (resource kind, namespace, action category).
//! 4. At `Act` level, soft guardrails and the autonomous rate limit can
//!    still downgrade to approval.
//!
//! All of this is evaluated against one [`PolicySnapshot`] taken from the
//! [`PolicyStore`] at the start of a decision.

pub mod approval;
pub mod autonomy;
pub mod error;
pub mod gate;
pub mod guardrails;
pub mod ledger;
pub mod policy;
pub mod risk;
pub mod simulate;

pub use approval::{ApprovalAuthority, ApprovalToken, SYSTEM_APPROVER};
pub use autonomy::{AutonomyMatrix, AutonomyPolicy, PolicyRule};
pub use error::{SafetyError, SafetyResult};
pub use gate::{GateDecision, GateRequest, SafetyGate};
pub use guardrails::{
    FieldPolicy, FieldPolicySpec, GuardrailRule, GuardrailViolation, HardGuardrail,
    HardGuardrails, PolicyEffect, SoftGuardrail, SoftGuardrails,
    MAX_AUTONOMOUS_ACTIONS_PER_KIND_PER_HOUR,
};
pub use ledger::{AutonomousActionLedger, AutonomousPermit};
pub use policy::{PolicySnapshot, PolicyStore, SafetyConfig};
pub use risk::{
    estimated_downtime_secs, has_data_loss_potential, RiskAssessment, RiskAssessor, RiskContext,
    RiskFactors, RiskWeights,
};
