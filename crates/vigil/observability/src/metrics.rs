//! Prometheus metrics

use crate::error::ObservabilityResult;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Engine metrics, registered on one registry
#[derive(Clone)]
pub struct VigilMetrics {
    /// Investigations reaching a terminal state, by state
    pub investigations_total: IntCounterVec,

    pub active_investigations: IntGauge,

    /// Tool calls by tool and outcome
    pub tool_calls_total: IntCounterVec,

    /// Blocked recommendations by guardrail rule
    pub guardrail_blocks_total: IntCounterVec,

    /// Executions by outcome
    pub executions_total: IntCounterVec,

    /// Rollbacks by outcome
    pub rollbacks_total: IntCounterVec,

    /// Wall-clock duration of finished investigations
    pub investigation_duration_seconds: HistogramVec,
}

impl VigilMetrics {
    pub fn new(registry: &Registry) -> ObservabilityResult<Self> {
        let investigations_total = IntCounterVec::new(
            Opts::new("vigil_investigations_total", "Investigations by terminal state"),
            &["state"],
        )?;
        registry.register(Box::new(investigations_total.clone()))?;

        let active_investigations = IntGauge::new(
            "vigil_active_investigations",
            "Investigations currently holding a concurrency permit",
        )?;
        registry.register(Box::new(active_investigations.clone()))?;

        let tool_calls_total = IntCounterVec::new(
            Opts::new("vigil_tool_calls_total", "Tool invocations"),
            &["tool", "outcome"],
        )?;
        registry.register(Box::new(tool_calls_total.clone()))?;

        let guardrail_blocks_total = IntCounterVec::new(
            Opts::new("vigil_guardrail_blocks_total", "Recommendations blocked by guardrails"),
            &["rule"],
        )?;
        registry.register(Box::new(guardrail_blocks_total.clone()))?;

        let executions_total = IntCounterVec::new(
            Opts::new("vigil_executions_total", "Action executions"),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(executions_total.clone()))?;

        let rollbacks_total = IntCounterVec::new(
            Opts::new("vigil_rollbacks_total", "Rollbacks"),
            &["outcome"],
        )?;
        registry.register(Box::new(rollbacks_total.clone()))?;

        let investigation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "vigil_investigation_duration_seconds",
                "Investigation duration",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
            &["state"],
        )?;
        registry.register(Box::new(investigation_duration_seconds.clone()))?;

        Ok(Self {
            investigations_total,
            active_investigations,
            tool_calls_total,
            guardrail_blocks_total,
            executions_total,
            rollbacks_total,
            investigation_duration_seconds,
        })
    }

    /// Metrics on a private registry, for tests and embedded use
    pub fn unregistered() -> ObservabilityResult<Self> {
        Self::new(&Registry::new())
    }

    pub fn record_terminal(&self, state: &str, duration_secs: f64) {
        self.investigations_total.with_label_values(&[state]).inc();
        self.investigation_duration_seconds
            .with_label_values(&[state])
            .observe(duration_secs);
    }

    pub fn record_tool_call(&self, tool: &str, outcome: &str) {
        self.tool_calls_total.with_label_values(&[tool, outcome]).inc();
    }
}

/// Prometheus text exposition of a registry
pub fn export_metrics(registry: &Registry) -> ObservabilityResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_export() {
        let registry = Registry::new();
        let metrics = VigilMetrics::new(&registry).unwrap();
        metrics.record_tool_call("get_pod_status", "ok");
        metrics.record_terminal("completed", 12.0);
        metrics.guardrail_blocks_total.with_label_values(&["hard:ScaleToZero"]).inc();

        let text = export_metrics(&registry).unwrap();
        assert!(text.contains("vigil_tool_calls_total{outcome=\"ok\",tool=\"get_pod_status\"} 1"));
        assert!(text.contains("vigil_investigations_total{state=\"completed\"} 1"));
    }

    #[test]
    fn test_double_registration_is_an_error() {
        let registry = Registry::new();
        assert!(VigilMetrics::new(&registry).is_ok());
        assert!(VigilMetrics::new(&registry).is_err());
    }
}
