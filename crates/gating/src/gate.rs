//! The attention gate proper — integrated path through a live provider with
//! automatic fallback to the local heuristic.

use std::sync::Arc;

use attune_core::collab::AttentionProvider;
use attune_core::config::GatingConfig;
use attune_core::types::{
    AttentionDecision, AttentionState, Message, SymbolicContext, UserContext,
};
use chrono::{Local, Utc};
use tracing::warn;

use crate::heuristics;

/// An attention decision plus whether it came from the heuristic fallback.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub decision: AttentionDecision,
    pub fallback: bool,
}

/// Combines a live attention provider (when registered) with the local
/// heuristic to produce one `AttentionDecision` per message.
pub struct AttentionGate {
    provider: Option<Arc<dyn AttentionProvider>>,
    config: GatingConfig,
}

impl AttentionGate {
    pub fn new(config: GatingConfig) -> Self {
        Self {
            provider: None,
            config,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn AttentionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Decide approve/block/defer for one message. Falls back to the local
    /// heuristic when no provider is registered or the provider errors.
    pub async fn decide(
        &self,
        message: &Message,
        ctx: &UserContext,
        symbolic: Option<&SymbolicContext>,
    ) -> GateResult {
        let local_time = Local::now().time();

        if let Some(provider) = &self.provider {
            let synthesized;
            let context = match symbolic {
                Some(sc) => sc,
                None => {
                    synthesized = heuristics::degraded_context(local_time);
                    &synthesized
                }
            };

            match provider
                .check_availability(&ctx.user_id, message, context)
                .await
            {
                Ok(decision) => {
                    return GateResult {
                        decision: self.resolve(decision, message),
                        fallback: false,
                    };
                }
                Err(e) => {
                    warn!(
                        user_id = %ctx.user_id,
                        message_id = %message.id,
                        error = %e,
                        "attention provider failed, using heuristic"
                    );
                }
            }
        }

        GateResult {
            decision: heuristics::decide(message, ctx, local_time, Utc::now(), &self.config),
            fallback: true,
        }
    }

    /// Post-process a provider decision: fill in a wake time for deferring
    /// states that lack one, and let high-priority messages bypass deferral.
    fn resolve(&self, decision: AttentionDecision, message: &Message) -> AttentionDecision {
        if decision.approved {
            return decision;
        }

        let threshold = self.exception_priority(decision.state);
        if threshold > 0 && message.priority >= threshold {
            return AttentionDecision {
                approved: true,
                state: decision.state,
                wake_at: None,
                confidence: decision.confidence,
                reason: format!(
                    "priority {} exceeds {} exception threshold {}",
                    message.priority, decision.state, threshold
                ),
            };
        }

        let wake_at = decision
            .wake_at
            .or_else(|| heuristics::defer_duration(decision.state, &self.config).map(|d| Utc::now() + d));

        AttentionDecision { wake_at, ..decision }
    }

    fn exception_priority(&self, state: AttentionState) -> u8 {
        match state {
            AttentionState::Flow => self.config.flow_exception_priority,
            AttentionState::Busy => self.config.busy_exception_priority,
            AttentionState::Overwhelmed => self.config.overwhelmed_exception_priority,
            AttentionState::Focused => self.config.focused_exception_priority,
            // Stressed sits between overwhelmed and focused in severity.
            AttentionState::Stressed => self.config.overwhelmed_exception_priority,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use attune_core::types::MessageCategory;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedProvider {
        decision: AttentionDecision,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AttentionProvider for FixedProvider {
        async fn check_availability(
            &self,
            _user_id: &str,
            _message: &Message,
            _context: &SymbolicContext,
        ) -> anyhow::Result<AttentionDecision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.decision.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl AttentionProvider for FailingProvider {
        async fn check_availability(
            &self,
            _user_id: &str,
            _message: &Message,
            _context: &SymbolicContext,
        ) -> anyhow::Result<AttentionDecision> {
            anyhow::bail!("attention service unreachable")
        }
    }

    #[tokio::test]
    async fn test_no_provider_uses_heuristic() {
        let gate = AttentionGate::new(GatingConfig::default());
        let msg = Message::new("user-1", MessageCategory::Reminder, 3);
        let ctx = UserContext::new("user-1", "T1");

        let result = gate.decide(&msg, &ctx, None).await;
        assert!(result.fallback);
        assert_eq!(result.decision.confidence, 0.6);
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let gate =
            AttentionGate::new(GatingConfig::default()).with_provider(Arc::new(FailingProvider));
        let msg = Message::new("user-1", MessageCategory::Reminder, 3);
        let ctx = UserContext::new("user-1", "T1");

        let result = gate.decide(&msg, &ctx, None).await;
        assert!(result.fallback);
    }

    #[tokio::test]
    async fn test_flow_state_interrupted_by_high_priority() {
        let provider = Arc::new(FixedProvider {
            decision: AttentionDecision {
                approved: false,
                state: AttentionState::Flow,
                wake_at: None,
                confidence: 0.9,
                reason: "deep in flow".to_string(),
            },
            calls: AtomicU32::new(0),
        });
        let gate = AttentionGate::new(GatingConfig::default()).with_provider(provider.clone());
        let ctx = UserContext::new("user-1", "T3");

        // Priority 9 exceeds the flow exception threshold (8).
        let urgent = Message::new("user-1", MessageCategory::Alert, 9);
        let result = gate.decide(&urgent, &ctx, None).await;
        assert!(!result.fallback);
        assert!(result.decision.approved);

        // Priority 3 stays blocked; flow has no defer duration, so no wake.
        let routine = Message::new("user-1", MessageCategory::Digest, 3);
        let result = gate.decide(&routine, &ctx, None).await;
        assert!(!result.decision.approved);
        assert!(result.decision.wake_at.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stressed_rejection_gains_wake_time() {
        let provider = Arc::new(FixedProvider {
            decision: AttentionDecision {
                approved: false,
                state: AttentionState::Stressed,
                wake_at: None,
                confidence: 0.85,
                reason: "elevated stress markers".to_string(),
            },
            calls: AtomicU32::new(0),
        });
        let gate = AttentionGate::new(GatingConfig::default()).with_provider(provider);
        let msg = Message::new("user-1", MessageCategory::Insight, 2);
        let ctx = UserContext::new("user-1", "T2");

        let before = Utc::now();
        let result = gate.decide(&msg, &ctx, None).await;
        assert!(!result.decision.approved);
        let wake = result.decision.wake_at.expect("stressed defers with a wake time");
        let hours = (wake - before).num_minutes() as f64 / 60.0;
        assert!((hours - 4.0).abs() < 0.1);
    }
}
