//! Context builder: gather, compress and bound evidence for a query

use crate::compress::{downsample, summarize_collection, summarize_events, CompressionLimits};
use crate::error::{ContextError, ContextResult};
use crate::item::{priority_order, ContextCategory, ContextItem};
use crate::packet::ContextPacket;
use crate::source::{ContextScope, ContextSource, RawContext};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use vigil_types::{IntentType, ResourceRef};

/// Context builder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Hard wall-clock deadline for assembling a packet
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Token budget for the whole packet
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Collections above this size are summarized
    #[serde(default = "default_cardinality_threshold")]
    pub cardinality_threshold: usize,

    /// Point budget per time series
    #[serde(default = "default_timeseries_points")]
    pub timeseries_points: usize,

    /// Exceptions listed verbatim in summaries
    #[serde(default = "default_max_exceptions")]
    pub max_exceptions: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            max_tokens: default_max_tokens(),
            cardinality_threshold: default_cardinality_threshold(),
            timeseries_points: default_timeseries_points(),
            max_exceptions: default_max_exceptions(),
        }
    }
}

fn default_deadline_ms() -> u64 {
    5_000
}

fn default_max_tokens() -> usize {
    8_000
}

fn default_cardinality_threshold() -> usize {
    20
}

fn default_timeseries_points() -> usize {
    60
}

fn default_max_exceptions() -> usize {
    10
}

impl ContextConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn limits(&self) -> CompressionLimits {
        CompressionLimits {
            cardinality_threshold: self.cardinality_threshold,
            max_exceptions: self.max_exceptions,
            timeseries_points: self.timeseries_points,
        }
    }

    pub fn validate(&self) -> ContextResult<()> {
        if self.max_tokens == 0 {
            return Err(ContextError::InvalidConfig("max_tokens must be positive".into()));
        }
        if self.timeseries_points < 2 {
            return Err(ContextError::InvalidConfig(
                "timeseries_points must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

/// Label a state object by its resource key when it names one
fn resource_label(value: &Value) -> Option<String> {
    let source = value.get("resource").unwrap_or(value);
    let kind = source.get("kind")?.as_str()?;
    let name = source.get("name")?.as_str()?;
    let resource = match source.get("namespace").and_then(Value::as_str) {
        Some(ns) => ResourceRef::namespaced(kind, ns, name),
        None => ResourceRef::cluster_scoped(kind, name),
    };
    Some(resource.key())
}

pub struct ContextBuilder {
    source: Arc<dyn ContextSource>,
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(source: Arc<dyn ContextSource>, config: ContextConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Assemble a packet for `intent` over `scope`.
    ///
    /// Categories are fetched in priority order. Once the deadline passes
    /// the remaining categories are skipped and the packet is marked partial.
    #[instrument(skip(self, scope), fields(intent = %intent, resources = scope.resources.len()))]
    pub async fn build(&self, intent: IntentType, scope: &ContextScope) -> ContextPacket {
        let deadline = Instant::now() + self.config.deadline();
        let mut packet = ContextPacket::new(intent, self.config.max_tokens);

        for (rank, category) in priority_order(intent).iter().copied().enumerate() {
            let now = Instant::now();
            if now >= deadline {
                packet.partial = true;
                packet.missed.push(category);
                continue;
            }
            match tokio::time::timeout(deadline - now, self.source.fetch(category, scope)).await {
                Ok(Ok(raw)) => {
                    for item in self.compress(category, rank, raw) {
                        packet.push(item);
                    }
                }
                Ok(Err(err)) => {
                    warn!(%category, error = %err, "context fetch failed, continuing without it");
                    packet.missed.push(category);
                }
                Err(_) => {
                    warn!(%category, "context deadline reached, proceeding with partial context");
                    packet.partial = true;
                    packet.missed.push(category);
                }
            }
        }

        debug!(
            items = packet.len(),
            tokens = packet.total_tokens,
            dropped = packet.dropped.len(),
            partial = packet.partial,
            "context packet assembled"
        );
        packet
    }

    fn compress(&self, category: ContextCategory, rank: usize, raw: RawContext) -> Vec<ContextItem> {
        let limits = self.config.limits();
        match raw {
            RawContext::Empty => Vec::new(),
            RawContext::Collection(items)
                if category == ContextCategory::CurrentState
                    && items.len() <= limits.cardinality_threshold =>
            {
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let label = resource_label(&item)
                            .unwrap_or_else(|| format!("{category}[{i}]"));
                        ContextItem::new(category, rank, label, item)
                    })
                    .collect()
            }
            RawContext::Collection(items) => vec![ContextItem::new(
                category,
                rank,
                category.as_str(),
                summarize_collection(items, &limits),
            )],
            RawContext::Events(events) => vec![ContextItem::new(
                category,
                rank,
                category.as_str(),
                summarize_events(events, &limits),
            )],
            RawContext::TimeSeries { metric, points } => {
                let original = points.len();
                let sampled = downsample(&points, limits.timeseries_points);
                vec![ContextItem::new(
                    category,
                    rank,
                    metric.clone(),
                    json!({
                        "metric": metric,
                        "original_points": original,
                        "points": sampled,
                    }),
                )]
            }
            RawContext::Document(doc) => vec![ContextItem::new(category, rank, category.as_str(), doc)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedSource {
        data: HashMap<ContextCategory, RawContext>,
        delays: HashMap<ContextCategory, Duration>,
    }

    #[async_trait]
    impl ContextSource for FixedSource {
        async fn fetch(&self, category: ContextCategory, _scope: &ContextScope) -> ContextResult<RawContext> {
            if let Some(delay) = self.delays.get(&category) {
                tokio::time::sleep(*delay).await;
            }
            match category {
                ContextCategory::Logs => Err(ContextError::SourceUnavailable("logs offline".into())),
                _ => Ok(self.data.get(&category).cloned().unwrap_or(RawContext::Empty)),
            }
        }
    }

    fn source(delays: HashMap<ContextCategory, Duration>) -> Arc<FixedSource> {
        let mut data = HashMap::new();
        data.insert(
            ContextCategory::CurrentState,
            RawContext::Collection(vec![json!({
                "kind": "Deployment", "namespace": "web", "name": "api",
                "spec": {"replicas": 3}
            })]),
        );
        data.insert(
            ContextCategory::RecentEvents,
            RawContext::Events(vec![
                json!({"type": "Normal", "reason": "Pulled"}),
                json!({"type": "Warning", "reason": "BackOff"}),
            ]),
        );
        data.insert(
            ContextCategory::Metrics,
            RawContext::TimeSeries {
                metric: "memory_working_set".into(),
                points: (0..500).map(|i| (i, i as f64)).collect(),
            },
        );
        Arc::new(FixedSource { data, delays })
    }

    #[tokio::test]
    async fn test_build_orders_and_compresses() {
        let builder = ContextBuilder::new(source(HashMap::new()), ContextConfig::default());
        let scope = ContextScope::resource(ResourceRef::namespaced("Deployment", "web", "api"));
        let packet = builder.build(IntentType::Diagnosis, &scope).await;

        assert!(!packet.partial);
        assert_eq!(packet.missed, vec![ContextCategory::Logs]);
        let items = packet.items();
        assert_eq!(items[0].category, ContextCategory::CurrentState);
        assert_eq!(items[0].label, "Deployment/web/api");
        assert_eq!(items[1].content["summary"], "1 routine events, 1 anomalous events");
        let metrics = packet.items_in(ContextCategory::Metrics).next().unwrap();
        assert_eq!(metrics.content["points"].as_array().unwrap().len(), 60);
        assert!(packet
            .state_of(&ResourceRef::namespaced("Deployment", "web", "api"))
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_partial_packet() {
        let mut delays = HashMap::new();
        delays.insert(ContextCategory::History, Duration::from_secs(30));
        let builder = ContextBuilder::new(source(delays), ContextConfig::default());
        let scope = ContextScope::resource(ResourceRef::namespaced("Deployment", "web", "api"));

        let started = Instant::now();
        let packet = builder.build(IntentType::Diagnosis, &scope).await;

        assert!(packet.partial);
        assert!(started.elapsed() <= Duration::from_millis(5_001));
        // Gathered before the slow category.
        assert_eq!(packet.items()[0].category, ContextCategory::CurrentState);
        assert!(packet.missed.contains(&ContextCategory::History));
        assert!(packet.missed.contains(&ContextCategory::Metrics));
    }
}
