//! Interface to the resource/event graph collaborator

use crate::error::ContextResult;
use crate::item::ContextCategory;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_types::ResourceRef;

/// Resources an investigation is about
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextScope {
    pub resources: Vec<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ContextScope {
    pub fn resource(resource: ResourceRef) -> Self {
        Self {
            namespace: resource.namespace.clone(),
            resources: vec![resource],
        }
    }

    pub fn primary(&self) -> Option<&ResourceRef> {
        self.resources.first()
    }
}

/// Raw material returned by a source, before compression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum RawContext {
    /// Many similar objects, e.g. pods of a deployment
    Collection(Vec<serde_json::Value>),
    /// Event log entries
    Events(Vec<serde_json::Value>),
    /// (unix seconds, value) samples
    TimeSeries {
        metric: String,
        points: Vec<(i64, f64)>,
    },
    /// Anything else, passed through as-is
    Document(serde_json::Value),
    Empty,
}

/// Fetches one category of context for a scope
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch(&self, category: ContextCategory, scope: &ContextScope) -> ContextResult<RawContext>;
}
