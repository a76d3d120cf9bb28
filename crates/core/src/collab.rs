//! Collaborator interfaces consumed by the pipeline.
//!
//! Collaborators are injected at construction time as `Arc<dyn Trait>`;
//! a missing or failing collaborator triggers the deterministic fallback
//! path for that phase, never an error surfaced to the caller.

use crate::error::EngineError;
use crate::types::{
    ArtifactHandle, AttentionDecision, FilteredMessage, Message, MessageCategory, ProcessReport,
    SymbolicContext, UserContext,
};
use async_trait::async_trait;

/// Verifies the recipient has permitted this category of message.
#[async_trait]
pub trait ConsentGate: Send + Sync {
    async fn check(&self, user_id: &str, category: MessageCategory) -> anyhow::Result<bool>;
}

/// Produces a symbolic view of recent user activity. Optional; when absent
/// the pipeline synthesizes a degraded time-of-day context.
#[async_trait]
pub trait ContextAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        user_id: &str,
        category: MessageCategory,
    ) -> anyhow::Result<SymbolicContext>;
}

/// Live attention-availability check. Optional; when absent the attention
/// gate falls back to its local heuristic.
#[async_trait]
pub trait AttentionProvider: Send + Sync {
    async fn check_availability(
        &self,
        user_id: &str,
        message: &Message,
        context: &SymbolicContext,
    ) -> anyhow::Result<AttentionDecision>;
}

/// Turns an approved, tier-filtered message into a renderable artifact.
#[async_trait]
pub trait PresentationGenerator: Send + Sync {
    async fn render(&self, filtered: &FilteredMessage) -> anyhow::Result<ArtifactHandle>;
}

/// Full pipeline entry point. Implemented by the orchestrator and consumed
/// by the scheduler's promotion loop, which re-submits deferred messages
/// without depending on the orchestrator crate directly.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(
        &self,
        message: Message,
        context: UserContext,
    ) -> Result<ProcessReport, EngineError>;
}

/// Permissive consent gate used when no live gate is registered. The
/// pipeline still honors the per-request `ConsentSnapshot` on top of it.
pub struct AllowAllConsent;

#[async_trait]
impl ConsentGate for AllowAllConsent {
    async fn check(&self, _user_id: &str, _category: MessageCategory) -> anyhow::Result<bool> {
        Ok(true)
    }
}
