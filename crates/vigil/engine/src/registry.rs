//! Active sessions and the archive of finished ones

use crate::report::InvestigationReport;
use crate::session::Session;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use vigil_graph::GraphSnapshot;
use vigil_types::{Evidence, Hypothesis, InvestigationId, TransitionRecord};

/// Shared handle to a live session.
///
/// The session itself sits behind an async mutex held by whichever task
/// drives it; readers get the last published report without waiting.
pub struct SessionHandle {
    pub id: InvestigationId,
    session: Mutex<Session>,
    cancel: AtomicBool,
    published: RwLock<InvestigationReport>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            id: session.id,
            published: RwLock::new(InvestigationReport::from_session(&session)),
            session: Mutex::new(session),
            cancel: AtomicBool::new(false),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn publish(&self, session: &Session) {
        *self.published.write() = InvestigationReport::from_session(session);
    }

    pub fn report(&self) -> InvestigationReport {
        self.published.read().clone()
    }
}

/// Immutable record kept after a session reaches a terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationRecord {
    pub report: InvestigationReport,
    pub transitions: Vec<TransitionRecord>,
    /// Hypotheses with their priors, for replaying the evidence
    pub hypotheses: Vec<Hypothesis>,
    pub evidence: Vec<Evidence>,
    pub graph: GraphSnapshot,
    pub archived_at: DateTime<Utc>,
}

impl InvestigationRecord {
    pub fn from_session(session: &Session) -> Self {
        Self {
            report: InvestigationReport::from_session(session),
            transitions: session.transitions.clone(),
            hypotheses: session.hypotheses.clone(),
            evidence: session.evidence.clone(),
            graph: session.graph.snapshot(),
            archived_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    active: DashMap<InvestigationId, Arc<SessionHandle>>,
    archive: DashMap<InvestigationId, Arc<InvestigationRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::new(session));
        self.active.insert(handle.id, Arc::clone(&handle));
        handle
    }

    pub fn active(&self, id: InvestigationId) -> Option<Arc<SessionHandle>> {
        self.active.get(&id).map(|h| Arc::clone(&h))
    }

    /// Handles of every session not yet archived
    pub fn active_handles(&self) -> Vec<Arc<SessionHandle>> {
        self.active.iter().map(|h| Arc::clone(h.value())).collect()
    }

    /// Move a terminal session out of the active set
    pub fn archive(&self, session: &Session) -> Arc<InvestigationRecord> {
        let record = Arc::new(InvestigationRecord::from_session(session));
        self.archive.insert(session.id, Arc::clone(&record));
        self.active.remove(&session.id);
        debug!(investigation_id = %session.id, "investigation archived");
        record
    }

    pub fn record(&self, id: InvestigationId) -> Option<Arc<InvestigationRecord>> {
        self.archive.get(&id).map(|r| Arc::clone(&r))
    }

    /// Live snapshot for an active session, the archived report otherwise
    pub fn report(&self, id: InvestigationId) -> Option<InvestigationReport> {
        if let Some(record) = self.record(id) {
            return Some(record.report.clone());
        }
        self.active(id).map(|h| h.report())
    }

    /// Every known investigation, oldest first
    pub fn list(&self) -> Vec<InvestigationReport> {
        let mut reports: Vec<InvestigationReport> = self
            .active
            .iter()
            .filter(|h| !self.archive.contains_key(h.key()))
            .map(|h| h.report())
            .chain(self.archive.iter().map(|r| r.report.clone()))
            .collect();
        reports.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        reports
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
