//! Vigil core types
//!
//! The data model shared by every Vigil crate: investigations and their
//! lifecycle states, hypotheses, evidence, findings, recommendations,
//! autonomy levels and the resource change feed.

pub mod action;
pub mod autonomy;
pub mod confidence;
pub mod error;
pub mod evidence;
pub mod hypothesis;
pub mod ids;
pub mod intent;
pub mod investigation;
pub mod recommendation;
pub mod resource;
pub mod risk;

pub use action::{ActionCategory, ActionKind, ProposedAction};
pub use autonomy::AutonomyLevel;
pub use confidence::ConfidenceBand;
pub use error::ParseError;
pub use evidence::{Evidence, Finding, LikelihoodContribution, Observation, Signal};
pub use hypothesis::{FailureMode, Hypothesis, HypothesisStatus};
pub use ids::{CorrelationId, EvidenceId, HypothesisId, InvestigationId, RecommendationId};
pub use intent::{ClarificationRequest, IntentClassification, IntentType};
pub use investigation::{BudgetLimit, BudgetUsage, InvestigationState, TransitionRecord};
pub use recommendation::{
    ApprovalState, Disposition, Recommendation, RecommendationTier, RollbackSnapshot,
};
pub use resource::{ChangeEvent, ChangeType, ResourceRef};
pub use risk::RiskBand;
