//! Bookkeeping for autonomous actions: rate windows, cooldowns, in-flight count

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vigil_types::ResourceRef;

/// Shared record of recent actions, consulted by the guardrails.
#[derive(Debug, Default)]
pub struct AutonomousActionLedger {
    /// Autonomous execution timestamps per resource kind
    autonomous_by_kind: DashMap<String, VecDeque<DateTime<Utc>>>,
    /// Last action (autonomous or approved) per resource key
    last_action: DashMap<String, DateTime<Utc>>,
    in_flight: Arc<AtomicUsize>,
}

impl AutonomousActionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Autonomous actions on `kind` within the hour ending at `now`
    pub fn autonomous_actions_last_hour(&self, kind: &str, now: DateTime<Utc>) -> u32 {
        let cutoff = now - Duration::hours(1);
        match self.autonomous_by_kind.get_mut(kind) {
            Some(mut window) => {
                while window.front().is_some_and(|t| *t <= cutoff) {
                    window.pop_front();
                }
                window.len() as u32
            }
            None => 0,
        }
    }

    pub fn record_action(&self, resource: &ResourceRef, at: DateTime<Utc>) {
        self.last_action
            .entry(resource.key())
            .and_modify(|t| *t = (*t).max(at))
            .or_insert(at);
    }

    pub fn cooldown_remaining(
        &self,
        resource: &ResourceRef,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let last = *self.last_action.get(&resource.key())?;
        let remaining = last + cooldown - now;
        (remaining > Duration::zero()).then_some(remaining)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register an autonomous execution; the count drops when the permit does.
    pub fn begin_autonomous(&self, resource: &ResourceRef, now: DateTime<Utc>) -> AutonomousPermit {
        self.autonomous_by_kind
            .entry(resource.kind.clone())
            .or_default()
            .push_back(now);
        self.record_action(resource, now);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        AutonomousPermit {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

/// Held for the duration of one autonomous execution
#[derive(Debug)]
pub struct AutonomousPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for AutonomousPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
