//! Actions the engine can propose against managed resources

use crate::error::ParseError;
use crate::resource::ResourceRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Concrete mutation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Restart,
    Scale,
    Patch,
    /// Revert a workload to its previous revision
    RevertRevision,
    UpdateResources,
    Cordon,
    Drain,
    Delete,
    /// Write a captured state snapshot back to a resource
    ApplySnapshot,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::Restart,
        ActionKind::Scale,
        ActionKind::Patch,
        ActionKind::RevertRevision,
        ActionKind::UpdateResources,
        ActionKind::Cordon,
        ActionKind::Drain,
        ActionKind::Delete,
        ActionKind::ApplySnapshot,
    ];

    pub fn category(&self) -> ActionCategory {
        match self {
            ActionKind::Restart | ActionKind::RevertRevision => ActionCategory::Lifecycle,
            ActionKind::Scale => ActionCategory::Scaling,
            ActionKind::Patch | ActionKind::UpdateResources | ActionKind::ApplySnapshot => {
                ActionCategory::Configuration
            }
            ActionKind::Cordon | ActionKind::Drain => ActionCategory::NodeMaintenance,
            ActionKind::Delete => ActionCategory::Destructive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Restart => "restart",
            ActionKind::Scale => "scale",
            ActionKind::Patch => "patch",
            ActionKind::RevertRevision => "revert_revision",
            ActionKind::UpdateResources => "update_resources",
            ActionKind::Cordon => "cordon",
            ActionKind::Drain => "drain",
            ActionKind::Delete => "delete",
            ActionKind::ApplySnapshot => "apply_snapshot",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::ActionKind(s.to_string()))
    }
}

/// Grouping used as the third key of the autonomy policy matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Lifecycle,
    Scaling,
    Configuration,
    NodeMaintenance,
    Destructive,
}

impl ActionCategory {
    pub const ALL: [ActionCategory; 5] = [
        ActionCategory::Lifecycle,
        ActionCategory::Scaling,
        ActionCategory::Configuration,
        ActionCategory::NodeMaintenance,
        ActionCategory::Destructive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCategory::Lifecycle => "lifecycle",
            ActionCategory::Scaling => "scaling",
            ActionCategory::Configuration => "configuration",
            ActionCategory::NodeMaintenance => "node_maintenance",
            ActionCategory::Destructive => "destructive",
        }
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionCategory {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::ActionCategory(s.to_string()))
    }
}

/// An action with its target and parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub kind: ActionKind,
    pub target: ResourceRef,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ProposedAction {
    pub fn new(kind: ActionKind, target: ResourceRef) -> Self {
        Self {
            kind,
            target,
            parameters: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn category(&self) -> ActionCategory {
        self.kind.category()
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(Value::as_u64)
    }

    /// Desired replica count for scale actions
    pub fn target_replicas(&self) -> Option<u64> {
        self.param_u64("replicas")
    }

    /// Replica count at proposal time, if known
    pub fn current_replicas(&self) -> Option<u64> {
        self.param_u64("current_replicas")
    }

    pub fn describe(&self) -> String {
        match (self.kind, self.target_replicas()) {
            (ActionKind::Scale, Some(n)) => format!("scale {} to {} replicas", self.target, n),
            _ => format!("{} {}", self.kind, self.target),
        }
    }
}

impl fmt::Display for ProposedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ActionKind::Restart.category(), ActionCategory::Lifecycle);
        assert_eq!(ActionKind::Delete.category(), ActionCategory::Destructive);
        assert_eq!(ActionKind::Drain.category(), ActionCategory::NodeMaintenance);
        assert_eq!(
            ActionKind::ApplySnapshot.category(),
            ActionCategory::Configuration
        );
    }

    #[test]
    fn test_scale_params() {
        let action = ProposedAction::new(
            ActionKind::Scale,
            ResourceRef::namespaced("Deployment", "default", "api"),
        )
        .with_param("replicas", 0u64)
        .with_param("current_replicas", 3u64);
        assert_eq!(action.target_replicas(), Some(0));
        assert_eq!(action.current_replicas(), Some(3));
        assert_eq!(action.describe(), "scale Deployment/default/api to 0 replicas");
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("drain".parse::<ActionKind>(), Ok(ActionKind::Drain));
        assert!("explode".parse::<ActionKind>().is_err());
    }
}
