//! Scripted incident scenarios
//!
//! A scenario is a TOML file naming the query, the target resource, its
//! current state and what each diagnostic tool answers. Without a file the
//! built-in OOM scenario is replayed.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use vigil_engine::testing::{InMemoryActionBackend, ScriptedToolInvoker, StaticContextSource};
use vigil_types::{IntentType, ResourceRef};

/// One replayable incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub query: String,

    /// Skips intent classification when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentType>,

    pub target: ResourceRef,

    /// Current state of the target, served as context and mutated by actions
    #[serde(default = "default_state")]
    pub state: Value,

    #[serde(default)]
    pub tools: ToolScript,
}

/// Canned tool answers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolScript {
    /// Answer for any tool without its own entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default)]
    pub responses: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

fn default_state() -> Value {
    json!({})
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = toml::from_str(raw).context("parsing scenario")?;
        if scenario.query.trim().is_empty() {
            anyhow::bail!("scenario query is empty");
        }
        Ok(scenario)
    }

    /// A crash-looping deployment whose pods are OOM killed
    pub fn builtin() -> Self {
        Self {
            query: "why is api crashing".to_string(),
            intent: Some(IntentType::Diagnosis),
            target: ResourceRef::namespaced("Deployment", "web", "api"),
            state: json!({
                "spec": {
                    "replicas": 2,
                    "resources": { "limits": { "memory": "256Mi" } }
                }
            }),
            tools: ToolScript {
                default: Some(json!({ "signals": [] })),
                responses: BTreeMap::from([
                    (
                        "get_pod_status".to_string(),
                        json!({
                            "signals": ["oom_killed", "crash_loop"],
                            "summary": "3/3 pods restarted, last state OOMKilled"
                        }),
                    ),
                    (
                        "get_resource_metrics".to_string(),
                        json!({
                            "signals": ["memory_pressure"],
                            "summary": "working set at 98% of limit"
                        }),
                    ),
                ]),
                latency_ms: None,
            },
        }
    }

    pub fn tool_invoker(&self) -> ScriptedToolInvoker {
        let mut invoker = ScriptedToolInvoker::new();
        for (tool, result) in &self.tools.responses {
            invoker = invoker.with_response(tool.clone(), result.clone());
        }
        if let Some(default) = &self.tools.default {
            invoker = invoker.with_default(default.clone());
        }
        if let Some(ms) = self.tools.latency_ms {
            invoker = invoker.with_latency(Duration::from_millis(ms));
        }
        invoker
    }

    pub fn context_source(&self) -> StaticContextSource {
        StaticContextSource::new().with_state(&self.target, self.state.clone())
    }

    pub fn action_backend(&self) -> InMemoryActionBackend {
        InMemoryActionBackend::new().with_state(&self.target, self.state.clone())
    }
}
