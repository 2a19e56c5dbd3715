//! Compiled policy inspection

use crate::output::{print_json, OutputFormat};
use clap::Args;
use serde_json::json;
use vigil_engine::EngineConfig;
use vigil_safety::PolicySnapshot;
use vigil_types::ActionCategory;

#[derive(Args)]
pub struct PolicyArgs {
    /// Resolve the autonomy level for this resource kind
    #[arg(long, requires = "namespace")]
    kind: Option<String>,

    /// Resolve the autonomy level in this namespace
    #[arg(long, requires = "kind")]
    namespace: Option<String>,
}

pub fn execute(args: PolicyArgs, config: &EngineConfig, format: OutputFormat) -> anyhow::Result<()> {
    let policy = PolicySnapshot::compile(1, &config.safety_config())?;

    let resolved: Vec<(ActionCategory, _)> = match (&args.kind, &args.namespace) {
        (Some(kind), Some(namespace)) => ActionCategory::ALL
            .iter()
            .map(|category| (*category, policy.matrix.lookup(kind, namespace, *category)))
            .collect(),
        _ => Vec::new(),
    };

    match format {
        OutputFormat::Json => {
            let cells: Vec<_> = policy
                .matrix
                .describe()
                .into_iter()
                .map(|(cell, level)| json!({ "cell": cell, "level": level }))
                .collect();
            let resolved: Vec<_> = resolved
                .iter()
                .map(|(category, level)| json!({ "category": category, "level": level }))
                .collect();
            print_json(&json!({
                "version": policy.version,
                "default_level": policy.matrix.default_level(),
                "cells": cells,
                "resolved": resolved,
                "soft_guardrails": policy.soft_guardrails,
                "risk_weights": policy.source.risk_weights,
                "policies": policy.source.policies,
            }))
        }
        OutputFormat::Text => {
            println!("Policy version {}", policy.version);
            println!("  Default autonomy: {}", policy.matrix.default_level());

            println!("\nAutonomy matrix ({} cells):", policy.matrix.cell_count());
            for (cell, level) in policy.matrix.describe() {
                println!("  {cell:<60} {level}");
            }

            if let (Some(kind), Some(namespace)) = (&args.kind, &args.namespace) {
                println!("\nEffective levels for {kind} in {namespace}:");
                for (category, level) in &resolved {
                    println!("  {category:<12} {level}");
                }
            }

            let soft = &policy.soft_guardrails;
            println!("\nSoft guardrails:");
            println!("  max_scale_delta                   {}", soft.max_scale_delta);
            println!("  max_concurrent_autonomous_actions {}", soft.max_concurrent_autonomous_actions);
            println!("  min_confidence_for_autonomous     {}", soft.min_confidence_for_autonomous);
            println!("  cooldown_secs                     {}", soft.cooldown_secs);

            if !policy.source.policies.is_empty() {
                println!("\nField policies:");
                for spec in &policy.source.policies {
                    println!(
                        "  {} [{:?}] {}",
                        spec.name,
                        spec.effect,
                        spec.conditions.join(" AND ")
                    );
                }
            }
            Ok(())
        }
    }
}
