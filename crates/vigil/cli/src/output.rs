//! Output formatting utilities

use serde::Serialize;
use vigil_engine::InvestigationReport;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Print a single item as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Render a report as indented text
pub fn render_report(report: &InvestigationReport) -> String {
    let mut out = Vec::new();
    out.push(format!("Investigation {}", report.id));
    out.push(format!("  Query:  {}", report.query));
    if let Some(intent) = report.intent {
        out.push(format!("  Intent: {intent}"));
    }
    out.push(format!(
        "  State:  {} ({})",
        report.state, report.status
    ));
    out.push(format!(
        "  Budget: {} tool calls, {} tokens, {} ms, ${:.4}",
        report.budgets.tool_calls,
        report.budgets.tokens,
        report.budgets.elapsed_ms,
        report.budgets.cost_usd
    ));
    if let Some(limit) = report.budget_stop {
        out.push(format!("  Stopped by budget: {limit}"));
    }
    if !report.tool_backend_available {
        out.push("  Tool backend unavailable".to_string());
    }
    if report.audit_only {
        out.push("  Observe level: findings kept to the audit record".to_string());
    }
    if let Some(failure) = &report.failure {
        out.push(format!("  Failure: {failure}"));
    }

    if let Some(clarification) = &report.clarification {
        out.push(String::new());
        out.push(format!("Clarification needed: {}", clarification.message));
        let candidates: Vec<_> = clarification.candidates.iter().map(|c| c.as_str()).collect();
        out.push(format!("  Candidates: {}", candidates.join(", ")));
    }

    if !report.findings.is_empty() {
        out.push(String::new());
        out.push("Findings:".to_string());
        for finding in &report.findings {
            let band = finding
                .band
                .map(|b| b.label())
                .unwrap_or("-");
            let marker = if finding.co_equal { " (co-equal)" } else { "" };
            match finding.posterior {
                Some(p) => out.push(format!("  [{band} {p:.2}] {}{marker}", finding.summary)),
                None => out.push(format!("  [{band}] {}{marker}", finding.summary)),
            }
        }
    }

    if !report.next_steps.is_empty() {
        out.push(String::new());
        out.push("Next steps:".to_string());
        for step in &report.next_steps {
            out.push(format!("  - {step}"));
        }
    }

    if !report.recommendations.is_empty() {
        out.push(String::new());
        out.push("Recommendations:".to_string());
        for rec in &report.recommendations {
            out.push(format!(
                "  {} {:?} risk={} ({}) approval={:?}",
                rec.action, rec.tier, rec.risk_score, rec.risk_band, rec.approval_state
            ));
            if let Some(level) = rec.required_level {
                out.push(format!("      requires: {level}"));
            }
            if let Some(note) = &rec.status_note {
                out.push(format!("      note: {note}"));
            }
        }
    }

    if !report.rollbacks.is_empty() {
        out.push(String::new());
        out.push(format!("Rollbacks: {}", report.rollbacks.len()));
    }

    out.join("\n")
}
