//! Dry-run projection of an action's effect on resource state
//!
//! The same projection is shown to humans at Simulate level and used by the
//! in-memory action backend, so what is previewed is what a test applies.

use serde_json::{json, Map, Value};
use vigil_types::{ActionKind, ProposedAction};

/// State the resource would have after `action`
pub fn project(action: &ProposedAction, state: &Value) -> Value {
    let mut next = match state {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    match action.kind {
        ActionKind::Scale => {
            if let Some(replicas) = action.target_replicas() {
                with_spec(&mut next, |spec| {
                    spec.insert("replicas".into(), json!(replicas));
                });
            }
        }
        ActionKind::Restart => {
            let generation = next
                .get("restart_generation")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            next.insert("restart_generation".into(), json!(generation + 1));
        }
        ActionKind::Patch | ActionKind::UpdateResources => {
            with_spec(&mut next, |spec| {
                for (key, value) in &action.parameters {
                    spec.insert(key.clone(), value.clone());
                }
            });
        }
        ActionKind::RevertRevision => {
            let revision = next.get("revision").and_then(Value::as_u64).unwrap_or(1);
            next.insert("revision".into(), json!(revision.saturating_sub(1).max(1)));
        }
        ActionKind::Cordon => {
            with_spec(&mut next, |spec| {
                spec.insert("unschedulable".into(), json!(true));
            });
        }
        ActionKind::Drain => {
            with_spec(&mut next, |spec| {
                spec.insert("unschedulable".into(), json!(true));
            });
            next.insert("drained".into(), json!(true));
        }
        ActionKind::Delete => {
            next.insert("deleted".into(), json!(true));
        }
        ActionKind::ApplySnapshot => {
            // The snapshot replaces the state wholesale.
            return action
                .parameters
                .get("state")
                .cloned()
                .unwrap_or(Value::Object(next));
        }
    }

    Value::Object(next)
}

fn with_spec(state: &mut Map<String, Value>, edit: impl FnOnce(&mut Map<String, Value>)) {
    let mut spec = match state.remove("spec") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    edit(&mut spec);
    state.insert("spec".into(), Value::Object(spec));
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::ResourceRef;

    fn deploy() -> ResourceRef {
        ResourceRef::namespaced("Deployment", "default", "api")
    }

    #[test]
    fn test_scale_projection() {
        let action = ProposedAction::new(ActionKind::Scale, deploy()).with_param("replicas", 5u64);
        let next = project(&action, &json!({"spec": {"replicas": 2, "image": "api:1"}}));
        assert_eq!(next["spec"]["replicas"], 5);
        assert_eq!(next["spec"]["image"], "api:1");
    }

    #[test]
    fn test_restart_bumps_generation() {
        let action = ProposedAction::new(ActionKind::Restart, deploy());
        let once = project(&action, &json!({}));
        let twice = project(&action, &once);
        assert_eq!(twice["restart_generation"], 2);
    }

    #[test]
    fn test_apply_snapshot_is_idempotent() {
        let snapshot = json!({"spec": {"replicas": 3}, "revision": 7});
        let action = ProposedAction::new(ActionKind::ApplySnapshot, deploy())
            .with_param("state", snapshot.clone());
        let once = project(&action, &json!({"spec": {"replicas": 9}}));
        let twice = project(&action, &once);
        assert_eq!(once, snapshot);
        assert_eq!(twice, once);
    }
}
