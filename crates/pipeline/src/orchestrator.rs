//! The pipeline orchestrator. Phases run strictly in order; every phase
//! after consent has an integrated path through a live collaborator and a
//! deterministic fallback chosen automatically when the collaborator is
//! missing or fails. Fallback use is recorded in the trace, never raised.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use attune_core::collab::{
    ConsentGate, ContextAnalyzer, MessageProcessor, PresentationGenerator,
};
use attune_core::config::GatingConfig;
use attune_core::error::EngineError;
use attune_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use attune_core::session::{Phase, PhaseRecord, SessionStore};
use attune_core::types::{
    ArtifactHandle, DeferredEntry, FilteredMessage, IntegrationsAvailable, Message, Outcome,
    ProcessReport, SymbolicContext, UserContext,
};
use attune_gating::heuristics;
use attune_gating::AttentionGate;
use attune_scheduler::{DeferredSet, ReadyQueue};
use attune_tiering::{TierCatalog, TierError, TierPolicy};
use chrono::{Duration, Local, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Orchestrator {
    consent: Option<Arc<dyn ConsentGate>>,
    analyzer: Option<Arc<dyn ContextAnalyzer>>,
    gate: AttentionGate,
    gating_config: GatingConfig,
    policy: TierPolicy,
    presenter: Option<Arc<dyn PresentationGenerator>>,
    deferred: Arc<DeferredSet>,
    ready: Arc<ReadyQueue>,
    sessions: Arc<SessionStore>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(
        gating_config: GatingConfig,
        catalog: Arc<TierCatalog>,
        deferred: Arc<DeferredSet>,
        ready: Arc<ReadyQueue>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            consent: None,
            analyzer: None,
            gate: AttentionGate::new(gating_config.clone()),
            gating_config,
            policy: TierPolicy::new(catalog),
            presenter: None,
            deferred,
            ready,
            sessions,
            events: noop_sink(),
        }
    }

    pub fn with_consent_gate(mut self, gate: Arc<dyn ConsentGate>) -> Self {
        self.consent = Some(gate);
        self
    }

    pub fn with_context_analyzer(mut self, analyzer: Arc<dyn ContextAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_attention_provider(
        mut self,
        provider: Arc<dyn attune_core::collab::AttentionProvider>,
    ) -> Self {
        self.gate = AttentionGate::new(self.gating_config.clone()).with_provider(provider);
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

    pub fn integrations(&self) -> IntegrationsAvailable {
        IntegrationsAvailable {
            context: self.analyzer.is_some(),
            attention: self.gate.has_provider(),
        }
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// Run one message through every phase to a terminal or deferred
    /// outcome. Only malformed input errors; every other path returns a
    /// `ProcessReport`.
    pub async fn process_message(
        &self,
        message: Message,
        context: UserContext,
    ) -> Result<ProcessReport, EngineError> {
        validate(&message, &context)?;

        let session_id = self.sessions.begin(message.id, &context.user_id);
        metrics::counter!("pipeline.admitted").increment(1);
        self.events.emit(make_event(
            EventType::MessageAdmitted,
            Some(message.id),
            Some(context.user_id.clone()),
            Some(message.category.to_string()),
        ));

        // Phase 1: consent.
        let timer = Instant::now();
        let (permitted, consent_fallback, consent_summary) =
            self.check_consent(&message, &context).await;
        self.record(session_id, Phase::Consent, timer, consent_fallback, consent_summary);
        if !permitted {
            return Ok(self.finish_blocked(session_id, &message, &context, "consent_denied"));
        }

        // Phase 2: context analysis.
        let timer = Instant::now();
        let (symbolic, context_fallback) = self.analyze_context(&message, &context).await;
        self.record(
            session_id,
            Phase::ContextAnalysis,
            timer,
            context_fallback,
            format!(
                "activity={} coherence={:.2}",
                symbolic.dominant_activity, symbolic.coherence
            ),
        );

        // Phase 3: attention gating.
        let timer = Instant::now();
        let gate_result = self.gate.decide(&message, &context, Some(&symbolic)).await;
        if gate_result.fallback {
            self.events.emit(make_event(
                EventType::FallbackEngaged,
                Some(message.id),
                Some(context.user_id.clone()),
                Some(Phase::AttentionGating.to_string()),
            ));
        }
        let decision = gate_result.decision;
        self.record(
            session_id,
            Phase::AttentionGating,
            timer,
            gate_result.fallback,
            format!(
                "state={} approved={} confidence={:.2}: {}",
                decision.state, decision.approved, decision.confidence, decision.reason
            ),
        );

        if !decision.approved {
            if let Some(wake_at) = decision.wake_at {
                return Ok(self.finish_deferred(session_id, &message, &context, wake_at, &decision.reason));
            }
            return Ok(self.finish_blocked(session_id, &message, &context, &decision.reason));
        }

        // Phase 4: tier filtering.
        let timer = Instant::now();
        let filtered = match self.policy.apply(&message, &context.user_id, &context.tier_code) {
            Ok(filtered) => {
                self.record(
                    session_id,
                    Phase::TierFilter,
                    timer,
                    false,
                    format!(
                        "tier={} presentation={:?} ads={}",
                        filtered.tier_code, filtered.presentation, filtered.ad_eligible
                    ),
                );
                filtered
            }
            Err(TierError::CapExceeded { window, cap }) => {
                self.record(
                    session_id,
                    Phase::TierFilter,
                    timer,
                    false,
                    format!("{} cap of {} reached", window, cap),
                );
                metrics::counter!("pipeline.cap_exceeded").increment(1);
                return Ok(self.finish_blocked(session_id, &message, &context, "cap_exceeded"));
            }
        };

        // Phase 5: delivery handoff.
        let timer = Instant::now();
        let (artifact, handoff_fallback) = self.render(&filtered).await;
        self.record(
            session_id,
            Phase::Handoff,
            timer,
            handoff_fallback,
            format!("artifact={} kind={}", artifact.id, artifact.kind),
        );

        self.policy.record_delivery(&context.user_id);
        let boost = heuristics::priority_boost(decision.state);
        let effective_priority = message.priority.saturating_add(boost).min(10);
        self.ready.push(filtered, artifact.clone(), effective_priority);

        metrics::counter!("pipeline.delivered").increment(1);
        self.events.emit(make_event(
            EventType::MessageDelivered,
            Some(message.id),
            Some(context.user_id.clone()),
            Some(artifact.id.to_string()),
        ));
        info!(
            message_id = %message.id,
            user_id = %context.user_id,
            priority = effective_priority,
            "message delivered to ready queue"
        );

        Ok(self.report(session_id, Outcome::Delivered { artifact }, "delivered"))
    }

    /// Consent check: live gate when registered, the caller-supplied
    /// snapshot otherwise. A failing live gate degrades to the snapshot.
    async fn check_consent(&self, message: &Message, context: &UserContext) -> (bool, bool, String) {
        let snapshot_permits = context.consent.permits(message.category);

        if let Some(gate) = &self.consent {
            match gate.check(&context.user_id, message.category).await {
                Ok(permitted) => {
                    let allowed = permitted && snapshot_permits;
                    (allowed, false, format!("live gate permitted={}", permitted))
                }
                Err(e) => {
                    warn!(
                        user_id = %context.user_id,
                        error = %e,
                        "consent gate failed, using snapshot"
                    );
                    (
                        snapshot_permits,
                        true,
                        "live gate unavailable, used snapshot".to_string(),
                    )
                }
            }
        } else {
            (snapshot_permits, false, format!("snapshot permitted={}", snapshot_permits))
        }
    }

    /// Context analysis: live analyzer when registered, otherwise a
    /// degraded time-of-day context.
    async fn analyze_context(
        &self,
        message: &Message,
        context: &UserContext,
    ) -> (SymbolicContext, bool) {
        if let Some(analyzer) = &self.analyzer {
            match analyzer.analyze(&context.user_id, message.category).await {
                Ok(symbolic) => return (symbolic, false),
                Err(e) => {
                    warn!(
                        user_id = %context.user_id,
                        error = %e,
                        "context analyzer failed, synthesizing degraded context"
                    );
                    self.events.emit(make_event(
                        EventType::FallbackEngaged,
                        Some(message.id),
                        Some(context.user_id.clone()),
                        Some(Phase::ContextAnalysis.to_string()),
                    ));
                }
            }
        }
        (heuristics::degraded_context(Local::now().time()), true)
    }

    /// Presentation handoff: live generator when registered, otherwise a
    /// plain text artifact.
    async fn render(&self, filtered: &FilteredMessage) -> (ArtifactHandle, bool) {
        if let Some(presenter) = &self.presenter {
            match presenter.render(filtered).await {
                Ok(artifact) => return (artifact, false),
                Err(e) => {
                    warn!(
                        message_id = %filtered.message.id,
                        error = %e,
                        "presentation generator failed, using plain artifact"
                    );
                }
            }
        }
        (fallback_artifact(filtered), true)
    }

    fn record(
        &self,
        session_id: Uuid,
        phase: Phase,
        timer: Instant,
        fallback_mode: bool,
        summary: String,
    ) {
        self.sessions.record_phase(
            session_id,
            PhaseRecord {
                phase,
                duration_ms: timer.elapsed().as_millis() as u64,
                fallback_mode,
                summary,
            },
        );
    }

    fn finish_blocked(
        &self,
        session_id: Uuid,
        message: &Message,
        context: &UserContext,
        reason: &str,
    ) -> ProcessReport {
        metrics::counter!("pipeline.blocked").increment(1);
        self.events.emit(make_event(
            EventType::MessageBlocked,
            Some(message.id),
            Some(context.user_id.clone()),
            Some(reason.to_string()),
        ));
        debug!(message_id = %message.id, reason = %reason, "message blocked");
        self.report(
            session_id,
            Outcome::Blocked {
                reason: reason.to_string(),
            },
            "blocked",
        )
    }

    fn finish_deferred(
        &self,
        session_id: Uuid,
        message: &Message,
        context: &UserContext,
        wake_at: chrono::DateTime<Utc>,
        reason: &str,
    ) -> ProcessReport {
        // The deferred-set invariant wants a wake strictly in the future; a
        // provider handing back an elapsed wake gets nudged forward.
        let now = Utc::now();
        let wake_at = if wake_at <= now {
            warn!(message_id = %message.id, "deferral wake time already elapsed, nudging forward");
            now + Duration::minutes(1)
        } else {
            wake_at
        };

        self.deferred.insert(DeferredEntry {
            message: message.clone(),
            context: context.clone(),
            wake_at,
            retries: 0,
        });

        metrics::counter!("pipeline.deferred").increment(1);
        self.events.emit(make_event(
            EventType::MessageDeferred,
            Some(message.id),
            Some(context.user_id.clone()),
            Some(wake_at.to_rfc3339()),
        ));
        debug!(message_id = %message.id, wake_at = %wake_at, "message deferred");

        self.report(
            session_id,
            Outcome::Deferred {
                wake_at,
                reason: reason.to_string(),
            },
            "deferred",
        )
    }

    fn report(&self, session_id: Uuid, outcome: Outcome, label: &str) -> ProcessReport {
        let session = self.sessions.finalize(session_id, label);
        let (trace, elapsed_ms) = session
            .map(|s| (s.phases, s.total_ms.unwrap_or(0)))
            .unwrap_or_default();
        ProcessReport {
            outcome,
            trace,
            elapsed_ms,
        }
    }
}

#[async_trait]
impl MessageProcessor for Orchestrator {
    async fn process(
        &self,
        message: Message,
        context: UserContext,
    ) -> Result<ProcessReport, EngineError> {
        self.process_message(message, context).await
    }
}

fn validate(message: &Message, context: &UserContext) -> Result<(), EngineError> {
    if message.user_id.is_empty() || context.user_id.is_empty() {
        return Err(EngineError::Validation("empty user id".to_string()));
    }
    if message.user_id != context.user_id {
        return Err(EngineError::Validation(format!(
            "message user {} does not match context user {}",
            message.user_id, context.user_id
        )));
    }
    if message.priority > 10 {
        return Err(EngineError::Validation(format!(
            "priority {} out of range 0..=10",
            message.priority
        )));
    }
    if message.is_expired(Utc::now()) {
        return Err(EngineError::Validation("message already expired".to_string()));
    }
    Ok(())
}

fn fallback_artifact(filtered: &FilteredMessage) -> ArtifactHandle {
    ArtifactHandle {
        id: Uuid::new_v4(),
        kind: format!("plain_{}", filtered.message.category),
        uri: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attune_core::types::MessageCategory;

    #[test]
    fn test_validate_rejects_mismatched_users() {
        let message = Message::new("user-1", MessageCategory::Reminder, 3);
        let context = UserContext::new("user-2", "T1");
        assert!(matches!(
            validate(&message, &context),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_priority() {
        let message = Message::new("user-1", MessageCategory::Reminder, 11);
        let context = UserContext::new("user-1", "T1");
        assert!(validate(&message, &context).is_err());
    }

    #[test]
    fn test_validate_rejects_expired_message() {
        let mut message = Message::new("user-1", MessageCategory::Reminder, 3);
        message.expires_at = Some(Utc::now() - Duration::minutes(1));
        let context = UserContext::new("user-1", "T1");
        assert!(validate(&message, &context).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed_input() {
        let message = Message::new("user-1", MessageCategory::Reminder, 3);
        let context = UserContext::new("user-1", "T1");
        assert!(validate(&message, &context).is_ok());
    }
}
