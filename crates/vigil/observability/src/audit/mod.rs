//! Tamper-evident audit trail
//!
//! Every entry carries the SHA-256 of its predecessor, so removing or
//! rewriting any record breaks [`IntegrityVerifier::verify_chain`].

pub mod entry;
pub mod integrity;
pub mod query;
pub mod sink;

pub use entry::{
    ActorType, AuditAction, AuditActor, AuditEntry, AuditEntryBuilder, AuditOutcome,
    PartialAuditEntry,
};
pub use integrity::{ChainVerification, IntegrityChain, IntegrityVerifier};
pub use query::AuditQuery;
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};
