//! Turn raw tool results into observations and a finding

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use vigil_types::{Observation, Signal};

/// What one tool result says
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub observations: Vec<Observation>,
    pub finding: String,
    pub change_at: Option<DateTime<Utc>>,
}

/// Reads the structured result format shared by evidence tools:
///
/// ```json
/// {
///   "signals": ["oom_killed", {"signal": "recent_rollout", "present": false}],
///   "summary": "3 OOMKilled restarts in 10 minutes",
///   "last_change_at": "2026-03-14T09:12:00Z"
/// }
/// ```
///
/// Unknown signal names are ignored. A result with no recognizable signals
/// is neutral evidence.
pub fn interpret(tool: &str, result: &Value) -> Interpretation {
    let mut observations = Vec::new();
    if let Some(signals) = result.get("signals").and_then(Value::as_array) {
        for entry in signals {
            let parsed = match entry {
                Value::String(name) => name.parse::<Signal>().ok().map(Observation::present),
                Value::Object(_) => entry
                    .get("signal")
                    .and_then(Value::as_str)
                    .and_then(|name| name.parse::<Signal>().ok())
                    .map(|signal| Observation {
                        signal,
                        present: entry.get("present").and_then(Value::as_bool).unwrap_or(true),
                    }),
                _ => None,
            };
            match parsed {
                Some(observation) if !observations.contains(&observation) => {
                    observations.push(observation)
                }
                Some(_) => {}
                None => debug!(%tool, entry = %entry, "unrecognized signal in tool result"),
            }
        }
    }

    let change_at = result
        .get("last_change_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));

    let finding = match result.get("summary").and_then(Value::as_str) {
        Some(summary) if !summary.is_empty() => summary.to_string(),
        _ if observations.is_empty() => format!("{tool}: no recognized signals"),
        _ => {
            let parts: Vec<String> = observations
                .iter()
                .map(|o| {
                    if o.present {
                        o.signal.to_string()
                    } else {
                        format!("no {}", o.signal)
                    }
                })
                .collect();
            format!("{tool}: {}", parts.join(", "))
        }
    };

    Interpretation {
        observations,
        finding,
        change_at,
    }
}
