//! Investigation event stream
//!
//! Events are fire-and-forget: nobody listening is fine, and a slow
//! subscriber lags instead of blocking the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vigil_types::{
    Disposition, HypothesisId, InvestigationId, InvestigationState, RecommendationId,
};

/// Channel capacity for the event stream
const EVENT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvestigationEventKind {
    StateChanged {
        from: InvestigationState,
        to: InvestigationState,
        reason: String,
    },
    ClarificationRequested {
        message: String,
    },
    ToolCalled {
        tool: String,
        outcome: String,
        calls: u32,
    },
    HypothesisUpdated {
        hypothesis: HypothesisId,
        posterior: f64,
    },
    RecommendationIssued {
        recommendation: RecommendationId,
        disposition: Disposition,
    },
    ExecutionFinished {
        recommendation: RecommendationId,
        success: bool,
    },
    RollbackFinished {
        recommendation: RecommendationId,
        success: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationEvent {
    pub investigation: InvestigationId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: InvestigationEventKind,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InvestigationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvestigationEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit(&self, investigation: InvestigationId, kind: InvestigationEventKind) {
        let _ = self.tx.send(InvestigationEvent {
            investigation,
            at: Utc::now(),
            kind,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(
            InvestigationId::generate(),
            InvestigationEventKind::ClarificationRequested {
                message: "which intent?".into(),
            },
        );
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let id = InvestigationId::generate();
        bus.emit(
            id,
            InvestigationEventKind::StateChanged {
                from: InvestigationState::Created,
                to: InvestigationState::Observing,
                reason: "intent classified".into(),
            },
        );
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("timeout")
            .expect("receive error");
        assert_eq!(event.investigation, id);
        assert!(matches!(
            event.kind,
            InvestigationEventKind::StateChanged {
                to: InvestigationState::Observing,
                ..
            }
        ));
    }
}
