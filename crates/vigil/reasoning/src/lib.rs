//! Vigil reasoning pipeline
//!
//! The numeric core of an investigation, kept free of I/O so that replaying
//! recorded evidence reproduces every score:
//!
//! - [`BaseRateTable`] seeds priors per resource kind.
//! - [`LikelihoodTable`] gives P(signal | failure mode); it is fixed, not learned.
//! - [`bayes`] updates the active hypotheses and [`PlausibilityCheck`]
//!   halves gains that are causally implausible.
//! - [`EvidencePlanner`] picks the next tool call and decides when to
//!   switch to discriminating evidence.
//! - [`ConfidenceScorer`] bands the final posteriors, and
//!   [`RecommendationSynthesizer`] turns confirmed causes into actions.
//!
//! Hypothesis text and intent come through the [`HypothesisGenerator`] and
//! [`IntentClassifier`] boundaries; deterministic implementations of both
//! ship here.

pub mod bayes;
pub mod config;
pub mod error;
pub mod generator;
pub mod intent;
pub mod interpret;
pub mod likelihood;
pub mod plausibility;
pub mod planner;
pub mod priors;
pub mod scorer;
pub mod synthesis;

pub use bayes::{apply, replay_posteriors, update, UpdateInput};
pub use config::ReasoningConfig;
pub use error::{ReasoningError, ReasoningResult};
pub use generator::{GenerationRequest, HypothesisGenerator, HypothesisProposal, TemplateGenerator};
pub use intent::{clarification_for, IntentClassifier, KeywordIntentClassifier};
pub use interpret::{interpret, Interpretation};
pub use likelihood::LikelihoodTable;
pub use plausibility::PlausibilityCheck;
pub use planner::{EvidencePlanner, EvidenceQuery, Separation, Strategy, TOOL_CATALOG};
pub use priors::BaseRateTable;
pub use scorer::{Conclusion, ConfidenceScorer, Scoring, CO_EQUAL_MARGIN};
pub use synthesis::{RecommendationSynthesizer, Remedy, SynthesisInput};
