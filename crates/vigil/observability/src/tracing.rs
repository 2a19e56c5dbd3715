//! Tracing initialization

use crate::error::{ObservabilityError, ObservabilityResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration for tracing initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracingConfig {
    pub service_name: String,

    /// Filter used when `RUST_LOG` is not set
    pub log_level: String,

    pub json_format: bool,

    pub enable_console: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "vigil".to_string(),
            log_level: "info".to_string(),
            json_format: false,
            enable_console: true,
        }
    }
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json_format(mut self) -> Self {
        self.json_format = true;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn without_console(mut self) -> Self {
        self.enable_console = false;
        self
    }

    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> ObservabilityResult<()> {
    let subscriber = tracing_subscriber::registry().with(config.env_filter());
    let result = if !config.enable_console {
        subscriber.try_init()
    } else if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        subscriber.with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);
        subscriber.with(fmt_layer).try_init()
    };
    result.map_err(|e| ObservabilityError::Tracing(e.to_string()))?;
    ::tracing::debug!(service = %config.service_name, "tracing initialized");
    Ok(())
}
