//! Builder for InvestigationEngine
//!
//! Collaborators are injected here. Only the tool invoker and a context
//! source are required; everything else has an in-process default.

use crate::backend::ActionBackend;
use crate::config::EngineConfig;
use crate::engine::{EngineInner, InvestigationEngine};
use crate::error::{EngineError, EngineResult};
use crate::events::EventBus;
use crate::execution::Executor;
use crate::registry::SessionRegistry;
use crate::scheduler::Scheduler;
use crate::tools::{RetryingInvoker, ToolInvoker};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use vigil_context::{ContextBuilder, ContextSource, ResourceCache};
use vigil_observability::{AuditSink, MemoryAuditSink, VigilMetrics};
use vigil_reasoning::{
    BaseRateTable, ConfidenceScorer, HypothesisGenerator, IntentClassifier,
    KeywordIntentClassifier, LikelihoodTable, PlausibilityCheck, RecommendationSynthesizer,
    TemplateGenerator,
};
use vigil_safety::{ApprovalAuthority, AutonomousActionLedger, PolicyStore, SafetyGate};

/// Builder for constructing an InvestigationEngine with its collaborators
pub struct EngineBuilder {
    config: EngineConfig,
    context_source: Option<Arc<dyn ContextSource>>,
    resource_cache: Option<Arc<ResourceCache>>,
    tool_invoker: Option<Arc<dyn ToolInvoker>>,
    action_backend: Option<Arc<dyn ActionBackend>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    generator: Option<Arc<dyn HypothesisGenerator>>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    base_rates: Option<BaseRateTable>,
    metrics: Option<VigilMetrics>,
    approval_secret: Option<Vec<u8>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            context_source: None,
            resource_cache: None,
            tool_invoker: None,
            action_backend: None,
            audit_sink: None,
            generator: None,
            classifier: None,
            base_rates: None,
            metrics: None,
            approval_secret: None,
        }
    }

    /// Set the resource/event graph collaborator
    pub fn with_context_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.context_source = Some(source);
        self
    }

    /// Set the cache fed by the change-event stream.
    ///
    /// Without an explicit context source the cache serves context itself.
    pub fn with_resource_cache(mut self, cache: Arc<ResourceCache>) -> Self {
        self.resource_cache = Some(cache);
        self
    }

    /// Set the evidence-fetching collaborator
    pub fn with_tool_invoker(mut self, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.tool_invoker = Some(invoker);
        self
    }

    /// Set the mutation collaborator; without one, execution is unreachable
    pub fn with_action_backend(mut self, backend: Arc<dyn ActionBackend>) -> Self {
        self.action_backend = Some(backend);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn HypothesisGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set the per-kind base rates used to seed priors
    pub fn with_base_rates(mut self, base_rates: BaseRateTable) -> Self {
        self.base_rates = Some(base_rates);
        self
    }

    pub fn with_metrics(mut self, metrics: VigilMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the key approval tokens are bound to
    pub fn with_approval_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.approval_secret = Some(secret.into());
        self
    }

    /// Build the engine with all components
    pub fn build(self) -> EngineResult<InvestigationEngine> {
        self.config.validate()?;

        let tools = self
            .tool_invoker
            .ok_or_else(|| EngineError::Config("tool_invoker required".into()))?;
        let source: Arc<dyn ContextSource> = match (self.context_source, &self.resource_cache) {
            (Some(source), _) => source,
            (None, Some(cache)) => Arc::clone(cache) as Arc<dyn ContextSource>,
            (None, None) => {
                return Err(EngineError::Config(
                    "context_source or resource_cache required".into(),
                ))
            }
        };

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => VigilMetrics::unregistered()?,
        };
        let base_rates = self.base_rates.unwrap_or_default();
        let generator = self
            .generator
            .unwrap_or_else(|| Arc::new(TemplateGenerator::new(base_rates.clone())));
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(KeywordIntentClassifier));
        let audit = self
            .audit_sink
            .unwrap_or_else(|| Arc::new(MemoryAuditSink::new()));

        let store = Arc::new(PolicyStore::new(&self.config.safety_config())?);
        let gate = SafetyGate::new(store, Arc::new(AutonomousActionLedger::new()));

        let secret = self
            .approval_secret
            .unwrap_or_else(|| Uuid::new_v4().as_bytes().to_vec());
        let authority = ApprovalAuthority::new(secret).with_ttl(self.config.execution.approval_ttl());
        let executor = self.action_backend.map(|backend| {
            Executor::new(backend, authority, self.config.execution.clone())
        });

        let scheduler = Scheduler::new(
            self.config.concurrency.max_concurrent_investigations,
            metrics.active_investigations.clone(),
        );

        info!(
            max_concurrent = self.config.concurrency.max_concurrent_investigations,
            max_tool_calls = self.config.budgets.max_tool_calls,
            action_backend = executor.is_some(),
            policy_version = gate.policy().version,
            "investigation engine built"
        );

        Ok(InvestigationEngine::from_inner(EngineInner {
            context: ContextBuilder::new(source, self.config.context.clone()),
            tools: RetryingInvoker::new(tools, self.config.tools.clone()),
            plausibility: PlausibilityCheck::with_window_hours(
                self.config.reasoning.plausibility_window_hours,
            ),
            config: self.config,
            registry: SessionRegistry::new(),
            scheduler,
            events: EventBus::new(),
            audit,
            metrics,
            cache: self.resource_cache,
            generator,
            classifier,
            base_rates,
            gate,
            executor,
            likelihoods: LikelihoodTable,
            scorer: ConfidenceScorer,
            synthesizer: RecommendationSynthesizer,
        }))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedToolInvoker, StaticContextSource};

    #[test]
    fn test_tool_invoker_required() {
        let err = EngineBuilder::default()
            .with_context_source(Arc::new(StaticContextSource::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("tool_invoker")));
    }

    #[test]
    fn test_cache_serves_as_context_source() {
        let engine = EngineBuilder::default()
            .with_tool_invoker(Arc::new(ScriptedToolInvoker::new()))
            .with_resource_cache(Arc::new(ResourceCache::new(64)))
            .build()
            .unwrap();
        assert!(!engine.action_backend_configured());
        assert_eq!(engine.policy().version, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.concurrency.max_concurrent_investigations = 0;
        let result = EngineBuilder::new(config)
            .with_tool_invoker(Arc::new(ScriptedToolInvoker::new()))
            .with_context_source(Arc::new(StaticContextSource::new()))
            .build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
