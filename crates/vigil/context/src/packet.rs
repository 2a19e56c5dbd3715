//! Size-bounded, priority-ordered context packet

use crate::item::{ContextCategory, ContextItem};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_types::{IntentType, ResourceRef};

/// Reference to an item removed for space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedItem {
    pub category: ContextCategory,
    pub label: String,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPacket {
    pub intent: IntentType,
    pub budget_tokens: usize,
    pub total_tokens: usize,
    items: Vec<ContextItem>,
    pub dropped: Vec<DroppedItem>,
    /// Categories not gathered because of errors or the deadline
    pub missed: Vec<ContextCategory>,
    /// True when the deadline cut gathering short
    pub partial: bool,
}

impl ContextPacket {
    pub fn new(intent: IntentType, budget_tokens: usize) -> Self {
        Self {
            intent,
            budget_tokens,
            total_tokens: 0,
            items: Vec::new(),
            dropped: Vec::new(),
            missed: Vec::new(),
            partial: false,
        }
    }

    /// Add an item, then shed lowest-priority items until under budget
    pub fn push(&mut self, item: ContextItem) {
        self.total_tokens += item.estimated_tokens;
        self.items.push(item);
        while self.total_tokens > self.budget_tokens && !self.items.is_empty() {
            // Lowest priority is the highest rank; among equals, the newest.
            let victim = self
                .items
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| a.rank.cmp(&b.rank).then(ia.cmp(ib)))
                .map(|(i, _)| i);
            let Some(victim) = victim else { break };
            let removed = self.items.remove(victim);
            self.total_tokens -= removed.estimated_tokens;
            debug!(
                category = %removed.category,
                label = %removed.label,
                tokens = removed.estimated_tokens,
                "context item dropped for space"
            );
            self.dropped.push(DroppedItem {
                category: removed.category,
                label: removed.label,
                estimated_tokens: removed.estimated_tokens,
            });
        }
    }

    /// Items in priority order
    pub fn items(&self) -> Vec<&ContextItem> {
        let mut items: Vec<&ContextItem> = self.items.iter().collect();
        items.sort_by_key(|i| i.rank);
        items
    }

    pub fn items_in(&self, category: ContextCategory) -> impl Iterator<Item = &ContextItem> {
        self.items.iter().filter(move |i| i.category == category)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Last known state of a resource, for rollback plans
    pub fn state_of(&self, resource: &ResourceRef) -> Option<serde_json::Value> {
        let key = resource.key();
        self.items_in(ContextCategory::CurrentState)
            .find(|i| i.label == key)
            .map(|i| i.content.clone())
    }

    /// Resources that would be touched alongside the target, the target included
    pub fn blast_radius(&self) -> usize {
        let adjacent: usize = self
            .items_in(ContextCategory::Topology)
            .map(|i| match &i.content {
                serde_json::Value::Array(a) => a.len(),
                serde_json::Value::Object(o) => o
                    .get("count")
                    .and_then(serde_json::Value::as_u64)
                    .map(|c| c as usize)
                    .unwrap_or(1),
                _ => 1,
            })
            .sum();
        1 + adjacent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(category: ContextCategory, rank: usize, label: &str, chars: usize) -> ContextItem {
        ContextItem::new(category, rank, label, json!("x".repeat(chars)))
    }

    #[test]
    fn test_overflow_drops_lowest_priority_first() {
        let mut p = ContextPacket::new(IntentType::Diagnosis, 100);
        p.push(item(ContextCategory::CurrentState, 0, "state", 160)); // 40 tokens
        p.push(item(ContextCategory::Logs, 5, "logs", 160)); // 40 tokens
        p.push(item(ContextCategory::RecentEvents, 1, "events", 160)); // 40 tokens
        assert_eq!(p.len(), 2);
        assert!(p.total_tokens <= 100);
        assert_eq!(p.dropped[0].category, ContextCategory::Logs);
        let kept: Vec<_> = p.items().iter().map(|i| i.category).collect();
        assert_eq!(
            kept,
            vec![ContextCategory::CurrentState, ContextCategory::RecentEvents]
        );
    }

    #[test]
    fn test_new_low_priority_item_is_dropped_itself() {
        let mut p = ContextPacket::new(IntentType::Diagnosis, 50);
        p.push(item(ContextCategory::CurrentState, 0, "state", 160));
        p.push(item(ContextCategory::Metrics, 4, "cpu", 160));
        assert_eq!(p.len(), 1);
        assert_eq!(p.dropped[0].label, "cpu");
    }

    #[test]
    fn test_blast_radius_counts_topology() {
        let mut p = ContextPacket::new(IntentType::Diagnosis, 10_000);
        p.push(ContextItem::new(
            ContextCategory::Topology,
            3,
            "neighbours",
            json!([{"name": "a"}, {"name": "b"}]),
        ));
        assert_eq!(p.blast_radius(), 3);
    }
}
