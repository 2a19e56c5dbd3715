//! Vigil observability
//!
//! - **Audit**: hash-chained, append-only records of every transition, tool
//!   call, recommendation, approval, execution and rollback
//! - **Tracing**: subscriber setup with env-filter and plain or JSON output
//! - **Metrics**: Prometheus counters and histograms for the engine

pub mod audit;
pub mod error;
pub mod metrics;
pub mod tracing;

pub use audit::{
    ActorType, AuditAction, AuditActor, AuditEntry, AuditOutcome, AuditQuery, AuditSink, ChainVerification,
    FileAuditSink, IntegrityVerifier, MemoryAuditSink, PartialAuditEntry,
};
pub use error::{ObservabilityError, ObservabilityResult};
pub use metrics::{export_metrics, VigilMetrics};
pub use tracing::{init_tracing, TracingConfig};
