//! Per-cluster concurrency limit
//!
//! Investigations beyond the limit wait for a permit instead of being
//! rejected. A permit is held only while a session reasons or executes.

use crate::error::{EngineError, EngineResult};
use prometheus::IntGauge;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use vigil_types::InvestigationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencySnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

pub struct Scheduler {
    limit: usize,
    permits: Arc<Semaphore>,
    waiters: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    active: IntGauge,
}

/// Held while a session runs; dropping it frees the slot
pub struct SessionPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
    active: IntGauge,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.active.dec();
    }
}

struct WaiterGuard(Arc<AtomicUsize>);

impl WaiterGuard {
    fn new(waiters: &Arc<AtomicUsize>) -> Self {
        waiters.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(waiters))
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(limit: usize, active: IntGauge) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            permits: Arc::new(Semaphore::new(limit)),
            waiters: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            active,
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self, investigation: InvestigationId) -> EngineResult<SessionPermit> {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let _waiting = WaiterGuard::new(&self.waiters);
                debug!(investigation_id = %investigation, limit = self.limit, "concurrency limit reached, queued");
                Arc::clone(&self.permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| EngineError::Config("investigation scheduler is closed".into()))?
            }
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.active.inc();
        Ok(SessionPermit {
            permit,
            in_flight: Arc::clone(&self.in_flight),
            active: self.active.clone(),
        })
    }

    pub fn snapshot(&self) -> ConcurrencySnapshot {
        ConcurrencySnapshot {
            limit: self.limit,
            in_flight: self.in_flight.load(Ordering::SeqCst),
            waiters: self.waiters.load(Ordering::SeqCst),
        }
    }
}
