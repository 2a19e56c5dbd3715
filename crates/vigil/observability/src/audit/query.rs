//! Audit query support

use super::entry::AuditEntry;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use vigil_types::InvestigationId;

/// Filter over audit entries
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub investigation: Option<InvestigationId>,

    /// Action name, e.g. `rollback_executed`
    pub action: Option<String>,

    /// Entries pointing back at this one
    pub related_to: Option<Uuid>,

    /// Inclusive
    pub from: Option<DateTime<Utc>>,

    /// Exclusive
    pub to: Option<DateTime<Utc>>,

    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn for_investigation(id: InvestigationId) -> Self {
        Self {
            investigation: Some(id),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn related_to(mut self, entry: Uuid) -> Self {
        self.related_to = Some(entry);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.investigation.is_some() && entry.investigation != self.investigation {
            return false;
        }
        if let Some(action) = &self.action {
            if entry.action.name() != action {
                return false;
            }
        }
        if self.related_to.is_some() && entry.related_entry != self.related_to {
            return false;
        }
        if self.from.is_some_and(|from| entry.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.timestamp >= to) {
            return false;
        }
        true
    }

    /// Matching entries in chain order, capped by `limit`
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a AuditEntry>) -> Vec<AuditEntry> {
        entries
            .into_iter()
            .filter(|e| self.matches(e))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
