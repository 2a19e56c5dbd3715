//! Autonomy policy matrix
//!
//! Maps (resource kind, namespace, action category) to the autonomy level a
//! recommendation is allowed to run at. The matrix is compiled in one go
//! from [`AutonomyPolicy`] and never patched afterwards.

use crate::error::{SafetyError, SafetyResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vigil_types::{ActionCategory, AutonomyLevel};

/// One configured cell pattern; `None` matches anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ActionCategory>,
    pub level: AutonomyLevel,
}

impl PolicyRule {
    pub fn for_namespace(namespace: impl Into<String>, level: AutonomyLevel) -> Self {
        Self {
            resource_kind: None,
            namespace: Some(namespace.into()),
            category: None,
            level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomyPolicy {
    /// Level for anything no rule matches
    #[serde(default = "default_level")]
    pub default_level: AutonomyLevel,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl Default for AutonomyPolicy {
    fn default() -> Self {
        Self {
            default_level: default_level(),
            rules: Vec::new(),
        }
    }
}

fn default_level() -> AutonomyLevel {
    AutonomyLevel::Recommend
}

type CellKey = (Option<String>, Option<String>, Option<ActionCategory>);

/// Compiled lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutonomyMatrix {
    default_level: AutonomyLevel,
    cells: HashMap<CellKey, AutonomyLevel>,
}

impl AutonomyMatrix {
    pub fn compile(policy: &AutonomyPolicy) -> SafetyResult<Self> {
        let mut cells: HashMap<CellKey, AutonomyLevel> = HashMap::new();
        for rule in &policy.rules {
            if rule.resource_kind.as_deref() == Some("")
                || rule.namespace.as_deref() == Some("")
            {
                return Err(SafetyError::InvalidPolicy(
                    "empty resource_kind or namespace in autonomy rule; omit the field to match any"
                        .into(),
                ));
            }
            let key = (
                rule.resource_kind.clone(),
                rule.namespace.clone(),
                rule.category,
            );
            // Conflicting duplicates resolve to the more restrictive level.
            cells
                .entry(key)
                .and_modify(|level| *level = (*level).min(rule.level))
                .or_insert(rule.level);
        }
        Ok(Self {
            default_level: policy.default_level,
            cells,
        })
    }

    pub fn default_level(&self) -> AutonomyLevel {
        self.default_level
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Most specific matching cell wins.
    ///
    /// Specificity is the number of fixed fields; among equally specific
    /// patterns namespace outranks resource kind, which outranks category.
    pub fn lookup(&self, kind: &str, namespace: &str, category: ActionCategory) -> AutonomyLevel {
        let k = Some(kind.to_string());
        let n = Some(namespace.to_string());
        let c = Some(category);
        let patterns: [CellKey; 7] = [
            (k.clone(), n.clone(), c),
            (k.clone(), n.clone(), None),
            (None, n.clone(), c),
            (k.clone(), None, c),
            (None, n, None),
            (k, None, None),
            (None, None, c),
        ];
        patterns
            .iter()
            .find_map(|key| self.cells.get(key).copied())
            .unwrap_or(self.default_level)
    }

    /// Rendered cells for display, most specific first
    pub fn describe(&self) -> Vec<(String, AutonomyLevel)> {
        let mut rows: Vec<_> = self
            .cells
            .iter()
            .map(|((k, n, c), level)| {
                let spec = [k.is_some(), n.is_some(), c.is_some()]
                    .iter()
                    .filter(|b| **b)
                    .count();
                let label = format!(
                    "kind={} namespace={} category={}",
                    k.as_deref().unwrap_or("*"),
                    n.as_deref().unwrap_or("*"),
                    c.map(|c| c.as_str()).unwrap_or("*"),
                );
                (spec, label, *level)
            })
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        rows.into_iter().map(|(_, label, level)| (label, level)).collect()
    }
}
