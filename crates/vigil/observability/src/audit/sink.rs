//! Audit sinks

use super::entry::{AuditEntry, PartialAuditEntry};
use super::integrity::IntegrityChain;
use super::query::AuditQuery;
use crate::error::ObservabilityResult;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use vigil_types::InvestigationId;

/// Append-only destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Chain and persist an entry
    async fn write(&self, entry: PartialAuditEntry) -> ObservabilityResult<AuditEntry>;

    async fn query(&self, query: &AuditQuery) -> ObservabilityResult<Vec<AuditEntry>>;

    async fn flush(&self) -> ObservabilityResult<()>;

    async fn entry_count(&self) -> ObservabilityResult<u64>;

    async fn entries_for(&self, investigation: InvestigationId) -> ObservabilityResult<Vec<AuditEntry>> {
        self.query(&AuditQuery::for_investigation(investigation)).await
    }
}

/// In-memory sink, for tests and the CLI
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
    chain: RwLock<IntegrityChain>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, partial: PartialAuditEntry) -> ObservabilityResult<AuditEntry> {
        let mut chain = self.chain.write();
        let entry = partial.finalize(chain.previous_hash());
        chain.update(&entry);
        self.entries.write().push(entry.clone());
        Ok(entry)
    }

    async fn query(&self, query: &AuditQuery) -> ObservabilityResult<Vec<AuditEntry>> {
        Ok(query.apply(self.entries.read().iter()))
    }

    async fn flush(&self) -> ObservabilityResult<()> {
        Ok(())
    }

    async fn entry_count(&self) -> ObservabilityResult<u64> {
        Ok(self.chain.read().entry_count())
    }
}

/// JSON-lines file sink with append-only writes
pub struct FileAuditSink {
    path: PathBuf,
    chain: RwLock<IntegrityChain>,
    /// Serializes appends so file order matches chain order
    append: tokio::sync::Mutex<()>,
    // Entries hashed but not yet appended, in chain order
    pending: Mutex<Vec<String>>,
}

impl FileAuditSink {
    /// Open or create the file, resuming the chain from its last entry
    pub async fn open(path: impl Into<PathBuf>) -> ObservabilityResult<Self> {
        let path = path.into();
        let chain = if tokio::fs::try_exists(&path).await? {
            let entries = Self::read_entries(&path).await?;
            IntegrityChain::from_state(
                entries.last().map(|e| e.entry_hash.clone()),
                entries.len() as u64,
            )
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            IntegrityChain::new()
        };

        Ok(Self {
            path,
            chain: RwLock::new(chain),
            append: tokio::sync::Mutex::new(()),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(path: &Path) -> ObservabilityResult<Vec<AuditEntry>> {
        let file = File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut entries = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    pub async fn read_all(&self) -> ObservabilityResult<Vec<AuditEntry>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }
        Self::read_entries(&self.path).await
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn write(&self, partial: PartialAuditEntry) -> ObservabilityResult<AuditEntry> {
        // Hash under the chain lock, then queue the line in chain order; no
        // lock is held across an await except the append mutex.
        let entry = {
            let mut chain = self.chain.write();
            let entry = partial.finalize(chain.previous_hash());
            let line = serde_json::to_string(&entry)?;
            chain.update(&entry);
            self.pending.lock().push(line);
            entry
        };

        let _guard = self.append.lock().await;
        let lines: Vec<String> = std::mem::take(&mut *self.pending.lock());
        if lines.is_empty() {
            // An earlier writer already appended this line.
            return Ok(entry);
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        for line in lines {
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        Ok(entry)
    }

    async fn query(&self, query: &AuditQuery) -> ObservabilityResult<Vec<AuditEntry>> {
        let entries = self.read_all().await?;
        Ok(query.apply(entries.iter()))
    }

    async fn flush(&self) -> ObservabilityResult<()> {
        Ok(())
    }

    async fn entry_count(&self) -> ObservabilityResult<u64> {
        Ok(self.chain.read().entry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{AuditAction, AuditOutcome};
    use crate::audit::integrity::IntegrityVerifier;

    fn partial(investigation: InvestigationId, action: AuditAction) -> PartialAuditEntry {
        AuditEntry::builder()
            .investigation(investigation)
            .action(action)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_memory_sink_chains_and_queries() {
        let sink = MemoryAuditSink::new();
        let a = InvestigationId::generate();
        let b = InvestigationId::generate();

        let first = sink.write(partial(a, AuditAction::InvestigationStarted)).await.unwrap();
        let second = sink.write(partial(b, AuditAction::InvestigationStarted)).await.unwrap();
        sink.write(partial(a, AuditAction::ToolCalled { tool: "get_events".into() }))
            .await
            .unwrap();

        assert_eq!(second.previous_hash, Some(first.entry_hash.clone()));
        assert_eq!(sink.entry_count().await.unwrap(), 3);
        assert_eq!(sink.entries_for(a).await.unwrap().len(), 2);
        let tools = sink
            .query(&AuditQuery::for_investigation(a).with_action("tool_called"))
            .await
            .unwrap();
        assert_eq!(tools.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_links_to_execution() {
        let sink = MemoryAuditSink::new();
        let id = InvestigationId::generate();
        let exec = sink.write(partial(id, AuditAction::ActionExecuted)).await.unwrap();
        let rollback = AuditEntry::builder()
            .investigation(id)
            .action(AuditAction::RollbackExecuted)
            .outcome(AuditOutcome::Success)
            .related_to(exec.id)
            .build()
            .unwrap();
        sink.write(rollback).await.unwrap();

        let linked = sink.query(&AuditQuery::default().related_to(exec.id)).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].action, AuditAction::RollbackExecuted);
    }

    #[tokio::test]
    async fn test_file_sink_persists_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("vigil.jsonl");
        let id = InvestigationId::generate();

        {
            let sink = FileAuditSink::open(&path).await.unwrap();
            sink.write(partial(id, AuditAction::InvestigationStarted)).await.unwrap();
            sink.write(partial(id, AuditAction::HypothesesGenerated)).await.unwrap();
        }

        let sink = FileAuditSink::open(&path).await.unwrap();
        assert_eq!(sink.entry_count().await.unwrap(), 2);
        sink.write(partial(id, AuditAction::InvestigationArchived)).await.unwrap();

        let entries = sink.read_all().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(IntegrityVerifier::verify_chain(&entries).valid);
        assert_eq!(sink.entries_for(id).await.unwrap().len(), 3);
    }
}
