//! Engine facade — wires the orchestrator, scheduler, and session store
//! together, starts the supervised background loops, and exposes the
//! health/status surface.

use std::sync::Arc;

use attune_core::collab::{
    AttentionProvider, ConsentGate, ContextAnalyzer, MessageProcessor, PresentationGenerator,
};
use attune_core::config::AppConfig;
use attune_core::error::EngineError;
use attune_core::event_bus::{noop_sink, EventSink};
use attune_core::session::SessionStore;
use attune_core::types::{Message, ProcessReport, StatusSnapshot, UserContext};
use attune_scheduler::{DeferredSet, DeliveryScheduler, ReadyQueue, Supervisor};
use attune_tiering::TierCatalog;
use tracing::info;

use crate::orchestrator::Orchestrator;

pub struct DeliveryEngine {
    orchestrator: Arc<Orchestrator>,
    scheduler: Arc<DeliveryScheduler>,
    supervisor: Supervisor,
    sessions: Arc<SessionStore>,
    ready: Arc<ReadyQueue>,
    deferred: Arc<DeferredSet>,
}

impl DeliveryEngine {
    pub fn builder(config: AppConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Run one message through the pipeline.
    pub async fn process(
        &self,
        message: Message,
        context: UserContext,
    ) -> Result<ProcessReport, EngineError> {
        self.orchestrator.process(message, context).await
    }

    /// Spawn the deferred-promotion, ready-dispatch, and session-eviction
    /// loops under the supervisor.
    pub fn start(&self) {
        self.scheduler.spawn_loops(&self.supervisor);
        info!(loops = ?self.supervisor.task_names(), "delivery engine started");
    }

    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    /// Cancel every deferred message for a user, e.g. after consent
    /// revocation. Returns how many entries were dropped.
    pub fn revoke_user(&self, user_id: &str) -> usize {
        self.scheduler.cancel_deferred_for_user(user_id)
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            active_deferred: self.deferred.len(),
            ready_queue_depth: self.ready.len(),
            avg_processing_ms: self.sessions.avg_processing_ms(),
            integrations: self.orchestrator.integrations(),
        }
    }

    pub fn scheduler(&self) -> &Arc<DeliveryScheduler> {
        &self.scheduler
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

/// Builds a `DeliveryEngine` with explicit collaborator injection; any
/// collaborator left unregistered runs on its fallback path.
pub struct EngineBuilder {
    config: AppConfig,
    catalog: Arc<TierCatalog>,
    consent: Option<Arc<dyn ConsentGate>>,
    analyzer: Option<Arc<dyn ContextAnalyzer>>,
    attention: Option<Arc<dyn AttentionProvider>>,
    presenter: Option<Arc<dyn PresentationGenerator>>,
    events: Arc<dyn EventSink>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            catalog: Arc::new(TierCatalog::with_defaults()),
            consent: None,
            analyzer: None,
            attention: None,
            presenter: None,
            events: noop_sink(),
        }
    }

    pub fn with_tier_catalog(mut self, catalog: Arc<TierCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_consent_gate(mut self, gate: Arc<dyn ConsentGate>) -> Self {
        self.consent = Some(gate);
        self
    }

    pub fn with_context_analyzer(mut self, analyzer: Arc<dyn ContextAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_attention_provider(mut self, provider: Arc<dyn AttentionProvider>) -> Self {
        self.attention = Some(provider);
        self
    }

    pub fn with_presentation_generator(mut self, presenter: Arc<dyn PresentationGenerator>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn build(self) -> DeliveryEngine {
        let ready = Arc::new(ReadyQueue::new());
        let deferred = Arc::new(DeferredSet::new());
        let sessions = Arc::new(SessionStore::new());

        let mut orchestrator = Orchestrator::new(
            self.config.gating.clone(),
            self.catalog,
            deferred.clone(),
            ready.clone(),
            sessions.clone(),
        )
        .with_event_sink(self.events.clone());

        if let Some(gate) = self.consent {
            orchestrator = orchestrator.with_consent_gate(gate);
        }
        if let Some(analyzer) = self.analyzer {
            orchestrator = orchestrator.with_context_analyzer(analyzer);
        }
        if let Some(provider) = self.attention {
            orchestrator = orchestrator.with_attention_provider(provider);
        }
        if let Some(presenter) = self.presenter {
            orchestrator = orchestrator.with_presentation_generator(presenter);
        }

        let orchestrator = Arc::new(orchestrator);
        let scheduler = Arc::new(DeliveryScheduler::new(
            ready.clone(),
            deferred.clone(),
            sessions.clone(),
            orchestrator.clone() as Arc<dyn MessageProcessor>,
            self.events,
            self.config.scheduler.clone(),
        ));

        DeliveryEngine {
            orchestrator,
            scheduler,
            supervisor: Supervisor::new(),
            sessions,
            ready,
            deferred,
        }
    }
}
