//! Integrity verification for audit chains

use super::entry::{compute_hash, AuditEntry};
use serde::{Deserialize, Serialize};

/// Head of an audit chain
#[derive(Debug, Default)]
pub struct IntegrityChain {
    last_hash: Option<String>,
    entry_count: u64,
}

impl IntegrityChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a chain loaded from storage
    pub fn from_state(last_hash: Option<String>, entry_count: u64) -> Self {
        Self {
            last_hash,
            entry_count,
        }
    }

    pub fn previous_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn update(&mut self, entry: &AuditEntry) {
        self.last_hash = Some(entry.entry_hash.clone());
        self.entry_count += 1;
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn head_hash(&self) -> Option<&String> {
        self.last_hash.as_ref()
    }
}

/// Verifies audit entries and chains
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    pub fn verify_entry(entry: &AuditEntry) -> bool {
        Self::compute_hash(entry) == entry.entry_hash
    }

    /// Check every entry hash and every link, stopping at the first break
    pub fn verify_chain(entries: &[AuditEntry]) -> ChainVerification {
        let mut result = ChainVerification {
            valid: true,
            total_entries: entries.len(),
            verified_entries: 0,
            first_invalid_index: None,
            error_message: None,
        };

        for (i, entry) in entries.iter().enumerate() {
            if !Self::verify_entry(entry) {
                result.fail(i, format!("entry {} has invalid hash", entry.id));
                return result;
            }
            if i > 0 {
                let expected = &entries[i - 1].entry_hash;
                if entry.previous_hash.as_ref() != Some(expected) {
                    result.fail(
                        i,
                        format!(
                            "entry {} has broken chain link (expected prev: {}, got: {:?})",
                            entry.id, expected, entry.previous_hash
                        ),
                    );
                    return result;
                }
            }
            result.verified_entries = i + 1;
        }
        result
    }

    fn compute_hash(entry: &AuditEntry) -> String {
        compute_hash(
            &entry.id,
            &entry.timestamp,
            &entry.investigation,
            &entry.actor,
            &entry.action,
            &entry.outcome,
            &entry.details,
            &entry.related_entry,
            entry.previous_hash.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_entries: usize,
    pub verified_entries: usize,
    pub first_invalid_index: Option<usize>,
    pub error_message: Option<String>,
}

impl ChainVerification {
    fn fail(&mut self, index: usize, message: String) {
        self.valid = false;
        self.first_invalid_index = Some(index);
        self.error_message = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{AuditAction, AuditOutcome};
    use vigil_types::InvestigationId;

    fn chain_of(n: usize) -> Vec<AuditEntry> {
        let id = InvestigationId::generate();
        let mut chain = IntegrityChain::new();
        (0..n)
            .map(|i| {
                let entry = AuditEntry::builder()
                    .investigation(id)
                    .action(AuditAction::ToolCalled {
                        tool: format!("tool-{i}"),
                    })
                    .build()
                    .unwrap()
                    .finalize(chain.previous_hash());
                chain.update(&entry);
                entry
            })
            .collect()
    }

    #[test]
    fn test_valid_chain() {
        let entries = chain_of(3);
        let result = IntegrityVerifier::verify_chain(&entries);
        assert!(result.valid);
        assert_eq!(result.verified_entries, 3);
    }

    #[test]
    fn test_tampered_content_detected() {
        let mut entries = chain_of(3);
        entries[1].outcome = AuditOutcome::failure("rewritten");
        let result = IntegrityVerifier::verify_chain(&entries);
        assert!(!result.valid);
        assert_eq!(result.first_invalid_index, Some(1));
    }

    #[test]
    fn test_removed_entry_breaks_link() {
        let mut entries = chain_of(3);
        entries.remove(1);
        let result = IntegrityVerifier::verify_chain(&entries);
        assert!(!result.valid);
        assert_eq!(result.first_invalid_index, Some(1));
        assert_eq!(result.verified_entries, 1);
    }

    #[test]
    fn test_empty_chain_is_valid() {
        assert!(IntegrityVerifier::verify_chain(&[]).valid);
    }
}
