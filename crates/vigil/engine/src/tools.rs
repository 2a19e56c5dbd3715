//! Tool-invocation interface to the evidence-fetching collaborator

use crate::config::ToolConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use vigil_types::InvestigationId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_name: String,
    pub parameters: serde_json::Value,
    pub investigation_id: InvestigationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub result: serde_json::Value,
    pub latency_ms: u64,
    #[serde(default)]
    pub cache_hit: bool,
}

impl ToolResponse {
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            latency_ms: 0,
            cache_hit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error("PERMISSION_DENIED: {0}")]
    PermissionDenied(String),

    #[error("DEADLINE_EXCEEDED: {0}")]
    DeadlineExceeded(String),

    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }

    /// The investigation cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::NotFound(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "not_found",
            ToolError::PermissionDenied(_) => "permission_denied",
            ToolError::DeadlineExceeded(_) => "deadline_exceeded",
            ToolError::Internal(_) => "internal",
        }
    }
}

/// Single `invoke(tool, params) -> result` contract
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, request: &ToolRequest) -> Result<ToolResponse, ToolError>;
}

/// Result of a call after retries
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub result: Result<ToolResponse, ToolError>,
    pub attempts: u32,
}

/// Retries retryable errors with capped exponential backoff
pub struct RetryingInvoker {
    inner: Arc<dyn ToolInvoker>,
    config: ToolConfig,
}

impl RetryingInvoker {
    pub fn new(inner: Arc<dyn ToolInvoker>, config: ToolConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub async fn invoke(&self, request: &ToolRequest) -> ToolOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.inner.invoke(request).await {
                Ok(response) => {
                    return ToolOutcome {
                        result: Ok(response),
                        attempts,
                    }
                }
                Err(err) if err.is_retryable() && attempts <= self.config.max_retries => {
                    let delay = self.config.backoff(attempts);
                    debug!(
                        tool = %request.tool_name,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying tool call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(tool = %request.tool_name, attempts, error = %err, "tool call failed");
                    return ToolOutcome {
                        result: Err(err),
                        attempts,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Flaky {
        script: Mutex<VecDeque<Result<ToolResponse, ToolError>>>,
        calls: Mutex<u32>,
    }

    impl Flaky {
        fn new(script: Vec<Result<ToolResponse, ToolError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ToolInvoker for Flaky {
        async fn invoke(&self, _request: &ToolRequest) -> Result<ToolResponse, ToolError> {
            *self.calls.lock() += 1;
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ToolError::Internal("script exhausted".into())))
        }
    }

    fn request() -> ToolRequest {
        ToolRequest {
            tool_name: "get_pod_status".into(),
            parameters: serde_json::Value::Null,
            investigation_id: InvestigationId::generate(),
        }
    }

    #[test]
    fn test_error_classes() {
        assert!(ToolError::NotFound("x".into()).is_fatal());
        assert!(!ToolError::NotFound("x".into()).is_retryable());
        for err in [
            ToolError::PermissionDenied("x".into()),
            ToolError::DeadlineExceeded("x".into()),
            ToolError::Internal("x".into()),
        ] {
            assert!(err.is_retryable());
            assert!(!err.is_fatal());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let inner = Flaky::new(vec![
            Err(ToolError::DeadlineExceeded("slow".into())),
            Err(ToolError::Internal("boom".into())),
            Ok(ToolResponse::new(serde_json::json!({"ok": true}))),
        ]);
        let invoker = RetryingInvoker::new(inner.clone(), ToolConfig::default());
        let outcome = invoker.invoke(&request()).await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(*inner.calls.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let inner = Flaky::new(vec![Err(ToolError::NotFound("no such pod".into()))]);
        let invoker = RetryingInvoker::new(inner.clone(), ToolConfig::default());
        let outcome = invoker.invoke(&request()).await;
        assert_eq!(outcome.result, Err(ToolError::NotFound("no such pod".into())));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_bounded() {
        let inner = Flaky::new(Vec::new());
        let invoker = RetryingInvoker::new(inner.clone(), ToolConfig::default());
        let outcome = invoker.invoke(&request()).await;
        assert!(outcome.result.is_err());
        // One attempt plus three retries.
        assert_eq!(*inner.calls.lock(), 4);
    }
}
