//! Resource cache fed by the inbound change feed
//!
//! The feed is at-least-once and only ordered per resource, so every event
//! is checked against the last version seen for its resource: repeats are
//! dropped as duplicates and older versions as stale. The cache doubles as
//! a [`ContextSource`], which is what lets explain-level investigations
//! finish when the live backend is down.

use crate::error::ContextResult;
use crate::item::ContextCategory;
use crate::source::{ContextScope, ContextSource, RawContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use tracing::trace;
use vigil_types::{ChangeEvent, ChangeType, ResourceRef};

/// How an event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    Duplicate,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResource {
    pub resource: ResourceRef,
    pub state: Value,
    pub resource_version: u64,
    pub updated_at: DateTime<Utc>,
    /// Tombstone: the resource was deleted but the last state is kept
    pub deleted: bool,
}

#[derive(Debug)]
pub struct ResourceCache {
    resources: RwLock<HashMap<String, CachedResource>>,
    recent: RwLock<VecDeque<ChangeEvent>>,
    recent_capacity: usize,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ResourceCache {
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            recent: RwLock::new(VecDeque::with_capacity(recent_capacity)),
            recent_capacity,
        }
    }

    pub fn apply(&self, event: ChangeEvent) -> ApplyOutcome {
        let resource = event.resource();
        let key = resource.key();
        {
            let mut resources = self.resources.write();
            if let Some(existing) = resources.get(&key) {
                let seen = (existing.resource_version, existing.updated_at);
                if event.sequence() == seen {
                    trace!(%key, "duplicate change event ignored");
                    return ApplyOutcome::Duplicate;
                }
                if event.sequence() < seen {
                    trace!(%key, "stale change event ignored");
                    return ApplyOutcome::Stale;
                }
            }
            resources.insert(
                key,
                CachedResource {
                    resource,
                    state: event.full_state.clone(),
                    resource_version: event.resource_version,
                    updated_at: event.timestamp,
                    deleted: event.change_type == ChangeType::Deleted,
                },
            );
        }

        let mut recent = self.recent.write();
        if recent.len() == self.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(event);
        ApplyOutcome::Applied
    }

    pub fn get(&self, resource: &ResourceRef) -> Option<CachedResource> {
        self.resources.read().get(&resource.key()).cloned()
    }

    /// Live (non-deleted) resources in a namespace
    pub fn in_namespace(&self, namespace: &str) -> Vec<CachedResource> {
        let mut out: Vec<_> = self
            .resources
            .read()
            .values()
            .filter(|r| !r.deleted && r.resource.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.resource.cmp(&b.resource));
        out
    }

    pub fn len(&self) -> usize {
        self.resources.read().values().filter(|r| !r.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn recent_events(&self) -> Vec<ChangeEvent> {
        self.recent.read().iter().cloned().collect()
    }

    fn state_document(entry: &CachedResource) -> Value {
        json!({
            "kind": entry.resource.kind,
            "namespace": entry.resource.namespace,
            "name": entry.resource.name,
            "resource_version": entry.resource_version,
            "deleted": entry.deleted,
            "state": entry.state,
        })
    }
}

fn is_unhealthy(state: &Value) -> bool {
    let status = state
        .get("status")
        .and_then(|s| s.as_str().or_else(|| s.get("phase").and_then(Value::as_str)))
        .unwrap_or("");
    matches!(
        status,
        "Failed" | "CrashLoopBackOff" | "Error" | "OOMKilled" | "NotReady" | "Unknown"
    )
}

#[async_trait]
impl ContextSource for ResourceCache {
    async fn fetch(&self, category: ContextCategory, scope: &ContextScope) -> ContextResult<RawContext> {
        let in_scope = |r: &ResourceRef| scope.resources.is_empty() || scope.resources.contains(r);

        let raw = match category {
            ContextCategory::CurrentState => RawContext::Collection(
                scope
                    .resources
                    .iter()
                    .filter_map(|r| self.get(r))
                    .map(|e| Self::state_document(&e))
                    .collect(),
            ),
            ContextCategory::RecentEvents | ContextCategory::History => RawContext::Events(
                self.recent
                    .read()
                    .iter()
                    .filter(|e| in_scope(&e.resource()) || category == ContextCategory::History)
                    .map(|e| {
                        let warning =
                            e.change_type == ChangeType::Deleted || is_unhealthy(&e.full_state);
                        json!({
                            "type": if warning { "Warning" } else { "Normal" },
                            "reason": e.change_type,
                            "object": e.resource().key(),
                            "timestamp": e.timestamp,
                        })
                    })
                    .collect(),
            ),
            ContextCategory::Topology => match &scope.namespace {
                Some(ns) => RawContext::Collection(
                    self.in_namespace(ns)
                        .into_iter()
                        .filter(|e| !scope.resources.contains(&e.resource))
                        .map(|e| {
                            json!({
                                "kind": e.resource.kind,
                                "namespace": e.resource.namespace,
                                "name": e.resource.name,
                                "status": e.state.get("status").cloned().unwrap_or(Value::Null),
                            })
                        })
                        .collect(),
                ),
                None => RawContext::Empty,
            },
            ContextCategory::Configuration => RawContext::Document(Value::Array(
                scope
                    .resources
                    .iter()
                    .filter_map(|r| self.get(r))
                    .map(|e| json!({"resource": e.resource.key(), "spec": e.state.get("spec")}))
                    .collect(),
            )),
            _ => RawContext::Empty,
        };
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(name: &str, version: u64, change: ChangeType, status: &str) -> ChangeEvent {
        ChangeEvent {
            resource_kind: "Pod".into(),
            name: name.into(),
            namespace: Some("web".into()),
            change_type: change,
            timestamp: Utc.timestamp_opt(1_700_000_000 + version as i64, 0).unwrap(),
            resource_version: version,
            full_state: json!({"status": status}),
        }
    }

    #[test]
    fn test_duplicates_and_stale_events_are_ignored() {
        let cache = ResourceCache::default();
        assert_eq!(cache.apply(event("a", 2, ChangeType::Added, "Running")), ApplyOutcome::Applied);
        assert_eq!(cache.apply(event("a", 2, ChangeType::Added, "Running")), ApplyOutcome::Duplicate);
        assert_eq!(cache.apply(event("a", 1, ChangeType::Added, "Pending")), ApplyOutcome::Stale);
        assert_eq!(cache.recent_events().len(), 1);
        let a = cache.get(&ResourceRef::namespaced("Pod", "web", "a")).unwrap();
        assert_eq!(a.state["status"], "Running");
    }

    #[test]
    fn test_interleaved_resources_apply_independently() {
        let cache = ResourceCache::default();
        cache.apply(event("b", 5, ChangeType::Added, "Running"));
        cache.apply(event("a", 1, ChangeType::Added, "Running"));
        cache.apply(event("b", 6, ChangeType::Modified, "CrashLoopBackOff"));
        assert_eq!(cache.len(), 2);
        let b = cache.get(&ResourceRef::namespaced("Pod", "web", "b")).unwrap();
        assert_eq!(b.resource_version, 6);
    }

    #[test]
    fn test_delete_leaves_tombstone() {
        let cache = ResourceCache::default();
        cache.apply(event("a", 1, ChangeType::Added, "Running"));
        cache.apply(event("a", 2, ChangeType::Deleted, "Running"));
        let a = cache.get(&ResourceRef::namespaced("Pod", "web", "a")).unwrap();
        assert!(a.deleted);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_recent_ring_is_bounded() {
        let cache = ResourceCache::new(2);
        for v in 1..=5 {
            cache.apply(event("a", v, ChangeType::Modified, "Running"));
        }
        let recent = cache.recent_events();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].resource_version, 5);
    }

    #[tokio::test]
    async fn test_cache_serves_context() {
        let cache = ResourceCache::default();
        cache.apply(event("a", 1, ChangeType::Added, "Running"));
        cache.apply(event("b", 1, ChangeType::Added, "Running"));
        cache.apply(event("a", 2, ChangeType::Modified, "CrashLoopBackOff"));
        let scope = ContextScope::resource(ResourceRef::namespaced("Pod", "web", "a"));

        let state = cache.fetch(ContextCategory::CurrentState, &scope).await.unwrap();
        let RawContext::Collection(items) = state else {
            panic!("expected collection")
        };
        assert_eq!(items[0]["state"]["status"], "CrashLoopBackOff");

        let events = cache.fetch(ContextCategory::RecentEvents, &scope).await.unwrap();
        let RawContext::Events(events) = events else {
            panic!("expected events")
        };
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["type"], "Warning");

        let topology = cache.fetch(ContextCategory::Topology, &scope).await.unwrap();
        let RawContext::Collection(neighbours) = topology else {
            panic!("expected collection")
        };
        assert_eq!(neighbours.len(), 1);
        assert_eq!(neighbours[0]["name"], "b");
    }
}
