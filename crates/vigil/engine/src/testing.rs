//! Deterministic collaborators for tests and offline scenario replays

use crate::backend::{
    ActionBackend, ActionRequest, ActionResponse, ActionResult, BackendError, VerificationStatus,
};
use crate::tools::{ToolError, ToolInvoker, ToolRequest, ToolResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use vigil_context::{ContextCategory, ContextResult, ContextScope, ContextSource, RawContext};
use vigil_reasoning::{GenerationRequest, HypothesisGenerator, HypothesisProposal, ReasoningResult};
use vigil_safety::simulate::project;
use vigil_types::{ActionKind, CorrelationId, ResourceRef};

/// Answers tool calls from a script keyed by tool name.
///
/// Queued responses for a tool are consumed first; after that the tool's
/// fixed response applies, then the default.
#[derive(Default)]
pub struct ScriptedToolInvoker {
    queued: Mutex<HashMap<String, VecDeque<Result<Value, ToolError>>>>,
    fixed: HashMap<String, Value>,
    default: Option<Value>,
    latency: Option<Duration>,
    calls: Mutex<Vec<ToolRequest>>,
}

impl ScriptedToolInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same result every time `tool` is called
    pub fn with_response(mut self, tool: impl Into<String>, result: Value) -> Self {
        self.fixed.insert(tool.into(), result);
        self
    }

    /// One-shot result for the next call to `tool`
    pub fn then(self, tool: impl Into<String>, result: Result<Value, ToolError>) -> Self {
        self.queued
            .lock()
            .entry(tool.into())
            .or_default()
            .push_back(result);
        self
    }

    /// Result for any tool without a script
    pub fn with_default(mut self, result: Value) -> Self {
        self.default = Some(result);
        self
    }

    /// Simulated latency per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<ToolRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ToolInvoker for ScriptedToolInvoker {
    async fn invoke(&self, request: &ToolRequest) -> Result<ToolResponse, ToolError> {
        self.calls.lock().push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let queued = self
            .queued
            .lock()
            .get_mut(&request.tool_name)
            .and_then(VecDeque::pop_front);
        let result = match queued {
            Some(result) => result?,
            None => self
                .fixed
                .get(&request.tool_name)
                .or(self.default.as_ref())
                .cloned()
                .ok_or_else(|| ToolError::NotFound(format!("no such tool: {}", request.tool_name)))?,
        };
        Ok(ToolResponse {
            result,
            latency_ms: self.latency.map(|d| d.as_millis() as u64).unwrap_or(0),
            cache_hit: false,
        })
    }
}

/// Applies actions to an in-memory state map with the same projection the
/// safety layer previews at Simulate level.
#[derive(Default)]
pub struct InMemoryActionBackend {
    states: DashMap<String, Value>,
    responses: DashMap<CorrelationId, ActionResponse>,
    executions: AtomicUsize,
    unavailable: AtomicBool,
    fail_verification: AtomicBool,
    fail_rollback: AtomicBool,
}

impl InMemoryActionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, resource: &ResourceRef, state: Value) -> Self {
        self.states.insert(resource.key(), state);
        self
    }

    pub fn state(&self, resource: &ResourceRef) -> Option<Value> {
        self.states.get(&resource.key()).map(|s| s.clone())
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make every post-condition check fail
    pub fn fail_verification(&self, fail: bool) {
        self.fail_verification.store(fail, Ordering::SeqCst);
    }

    /// Make snapshot replays fail
    pub fn fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Distinct requests applied, duplicates excluded
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionBackend for InMemoryActionBackend {
    async fn execute(&self, request: &ActionRequest) -> Result<ActionResponse, BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("in-memory backend switched off".into()));
        }
        if request.approval_token.is_none() {
            return Err(BackendError::Rejected("approval token missing".into()));
        }
        if let Some(earlier) = self.responses.get(&request.correlation) {
            return Ok(earlier.clone());
        }

        let response = if request.action_type == ActionKind::ApplySnapshot
            && self.fail_rollback.load(Ordering::SeqCst)
        {
            ActionResponse {
                result: ActionResult::Failure,
                new_state: self.state(&request.resource).unwrap_or(Value::Null),
                verification_status: VerificationStatus::Failed,
                message: Some("snapshot rejected by backend".into()),
            }
        } else {
            let key = request.resource.key();
            let current = self.states.get(&key).map(|s| s.clone()).unwrap_or(json!({}));
            let next = project(&request.action(), &current);
            self.states.insert(key, next.clone());
            ActionResponse {
                result: ActionResult::Success,
                new_state: next,
                verification_status: VerificationStatus::Pending,
                message: None,
            }
        };
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.responses.insert(request.correlation.clone(), response.clone());
        Ok(response)
    }

    async fn current_state(&self, resource: &ResourceRef) -> Result<Value, BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("in-memory backend switched off".into()));
        }
        Ok(self.state(resource).unwrap_or(json!({})))
    }

    async fn verify(
        &self,
        resource: &ResourceRef,
        expected: &Value,
    ) -> Result<VerificationStatus, BackendError> {
        if self.fail_verification.load(Ordering::SeqCst) {
            return Ok(VerificationStatus::Failed);
        }
        match self.state(resource) {
            Some(state) if &state == expected => Ok(VerificationStatus::Passed),
            _ => Ok(VerificationStatus::Failed),
        }
    }

    async fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}

/// Serves fixed raw context per category
#[derive(Debug, Clone, Default)]
pub struct StaticContextSource {
    data: HashMap<ContextCategory, RawContext>,
    delay: Option<Duration>,
}

impl StaticContextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: ContextCategory, raw: RawContext) -> Self {
        self.data.insert(category, raw);
        self
    }

    /// Current state of one resource, in the shape the context builder labels
    pub fn with_state(self, resource: &ResourceRef, state: Value) -> Self {
        self.with(
            ContextCategory::CurrentState,
            RawContext::Collection(vec![json!({
                "kind": resource.kind,
                "namespace": resource.namespace,
                "name": resource.name,
                "state": state,
            })]),
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ContextSource for StaticContextSource {
    async fn fetch(&self, category: ContextCategory, _scope: &ContextScope) -> ContextResult<RawContext> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.data.get(&category).cloned().unwrap_or(RawContext::Empty))
    }
}

/// Returns the same proposals for every request
#[derive(Debug, Clone, Default)]
pub struct FixedHypothesisGenerator {
    proposals: Vec<HypothesisProposal>,
    delay: Option<Duration>,
}

impl FixedHypothesisGenerator {
    pub fn new(proposals: Vec<HypothesisProposal>) -> Self {
        Self {
            proposals,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl HypothesisGenerator for FixedHypothesisGenerator {
    async fn generate(&self, _request: &GenerationRequest<'_>) -> ReasoningResult<Vec<HypothesisProposal>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.proposals.clone())
    }
}
