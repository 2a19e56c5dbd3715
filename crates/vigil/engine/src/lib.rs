//! Vigil investigation engine
//!
//! Drives one investigation per session through a fixed lifecycle:
//!
//! ```text
//! Created -> Observing -> Hypothesizing -> Investigating -> Analyzing
//!         -> Concluding -> Recommending -> AwaitingApproval
//!         -> Executing -> Verifying -> Completed
//! ```
//!
//! with `Failed`, `Timedout` and `Cancelled` as the other terminal states.
//! Evidence gathering is bounded by per-session budgets, every
//! recommendation passes the safety gate before it can be approved, and a
//! failed post-action check rolls the action back and reopens the
//! investigation.
//!
//! Collaborators (tool invoker, context source, action backend, audit sink)
//! are injected through [`EngineBuilder`].

pub mod backend;
pub mod budget;
pub mod builder;
pub mod config;
mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod tools;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{
    ActionBackend, ActionRequest, ActionResponse, ActionResult, BackendError, VerificationStatus,
};
pub use budget::BudgetTracker;
pub use builder::EngineBuilder;
pub use config::{
    BudgetConfig, ConcurrencyConfig, EngineConfig, ExecutionConfig,
    LoggingConfig, SafetySection, ToolConfig,
};
pub use engine::{InvestigationEngine, InvestigationRequest};
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, InvestigationEvent, InvestigationEventKind};
pub use execution::{
    ExecutionRecord, Executor, RollbackAttempt, RollbackOutcome, VerificationOutcome,
};
pub use registry::{InvestigationRecord, SessionRegistry};
pub use report::{InvestigationReport, RecommendationSummary, ReportStatus};
pub use scheduler::ConcurrencySnapshot;
pub use tools::{RetryingInvoker, ToolError, ToolInvoker, ToolOutcome, ToolRequest, ToolResponse};
