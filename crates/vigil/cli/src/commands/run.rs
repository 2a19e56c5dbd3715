//! Scenario replay

use crate::output::{print_json, render_report, OutputFormat};
use crate::scenario::Scenario;
use clap::Args;
use prometheus::Registry;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use vigil_engine::{EngineConfig, InvestigationEngine, InvestigationRequest};
use vigil_observability::{
    export_metrics, AuditQuery, AuditSink, FileAuditSink, IntegrityVerifier, MemoryAuditSink,
    VigilMetrics,
};
use vigil_types::{AutonomyLevel, IntentType};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario file (TOML); the built-in OOM scenario when omitted
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Override the scenario intent
    #[arg(long)]
    intent: Option<IntentType>,

    /// Override the default autonomy level
    #[arg(long)]
    autonomy: Option<AutonomyLevel>,

    /// Approve the first pending recommendation as this approver
    #[arg(long, value_name = "APPROVER")]
    approve: Option<String>,

    /// Append audit entries to this JSON-lines file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Print the audit trail and verify its hash chain
    #[arg(long)]
    audit: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,
}

pub async fn execute(
    args: RunArgs,
    mut config: EngineConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::builtin(),
    };
    if let Some(intent) = args.intent {
        scenario.intent = Some(intent);
    }
    if let Some(level) = args.autonomy {
        config.autonomy.default_level = level;
    }

    let registry = Registry::new();
    let metrics = VigilMetrics::new(&registry)?;
    let audit: Arc<dyn AuditSink> = match &args.audit_log {
        Some(path) => Arc::new(FileAuditSink::open(path.clone()).await?),
        None => Arc::new(MemoryAuditSink::new()),
    };

    let engine = InvestigationEngine::builder(config)
        .with_tool_invoker(Arc::new(scenario.tool_invoker()))
        .with_context_source(Arc::new(scenario.context_source()))
        .with_action_backend(Arc::new(scenario.action_backend()))
        .with_audit_sink(audit.clone())
        .with_metrics(metrics)
        .build()?;

    let mut request =
        InvestigationRequest::new(scenario.query.clone()).with_target(scenario.target.clone());
    if let Some(intent) = scenario.intent {
        request = request.with_intent(intent);
    }

    info!(target_resource = %scenario.target, query = %scenario.query, "replaying scenario");
    let mut report = engine.investigate(request).await?;

    if let Some(approver) = &args.approve {
        let pending = report.pending_approvals().next().map(|rec| rec.id);
        match pending {
            Some(rec) => {
                info!(recommendation = %rec, approver = %approver, "approving recommendation");
                report = engine.approve(report.id, rec, approver).await?;
            }
            None => warn!(investigation_id = %report.id, "nothing pending approval"),
        }
    }

    match format {
        OutputFormat::Text => println!("{}", render_report(&report)),
        OutputFormat::Json => print_json(&report)?,
    }

    if args.audit {
        audit.flush().await?;
        let trail = engine.audit_trail(report.id).await?;
        let chain = IntegrityVerifier::verify_chain(&audit.query(&AuditQuery::default()).await?);
        match format {
            OutputFormat::Text => {
                println!("\nAudit trail ({} entries):", trail.len());
                for entry in &trail {
                    println!(
                        "  {} {} by {} -> {:?}",
                        entry.timestamp.format("%H:%M:%S%.3f"),
                        entry.action,
                        entry.actor.id,
                        entry.outcome
                    );
                }
                if chain.valid {
                    println!("  chain verified ({} entries)", chain.verified_entries);
                } else {
                    println!(
                        "  chain broken at {:?}: {}",
                        chain.first_invalid_index,
                        chain.error_message.as_deref().unwrap_or("unknown")
                    );
                }
            }
            OutputFormat::Json => print_json(&json!({
                "entries": trail,
                "chain_valid": chain.valid,
                "verified_entries": chain.verified_entries,
            }))?,
        }
        if !chain.valid {
            anyhow::bail!("audit chain failed verification");
        }
    }

    if args.metrics {
        print!("{}", export_metrics(&registry)?);
    }

    Ok(())
}
