use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ─── Messages ───────────────────────────────────────────────────────────────

/// Category of a candidate message. Consent is scoped per category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    Reminder,
    Insight,
    Encouragement,
    Digest,
    Alert,
    Promotional,
}

impl std::fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MessageCategory::Reminder => "reminder",
            MessageCategory::Insight => "insight",
            MessageCategory::Encouragement => "encouragement",
            MessageCategory::Digest => "digest",
            MessageCategory::Alert => "alert",
            MessageCategory::Promotional => "promotional",
        };
        write!(f, "{}", label)
    }
}

/// A candidate message submitted for delivery. Immutable once admitted to
/// the pipeline; only the scheduler recomputes its effective priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub user_id: String,
    pub category: MessageCategory,
    /// Higher = more urgent. 0..=10.
    pub priority: u8,
    pub payload: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
    /// Marks the message for optimal-timing dispatch (held for a
    /// bio-rhythm window instead of being sent immediately).
    #[serde(default)]
    pub special: bool,
}

impl Message {
    pub fn new(user_id: impl Into<String>, category: MessageCategory, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            category,
            priority,
            payload: serde_json::json!({}),
            expires_at: None,
            special: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }
}

// ─── Recipient state ────────────────────────────────────────────────────────

/// Summary of the recipient's recent activity, supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActivitySummary {
    pub events_last_hour: u32,
    pub last_active: Option<DateTime<Utc>>,
    pub dominant_channel: Option<String>,
}

/// Point-in-time consent state for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentSnapshot {
    pub messaging_enabled: bool,
    /// Per-category opt-in; categories absent from the map are permitted.
    pub categories: HashMap<MessageCategory, bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ConsentSnapshot {
    fn default() -> Self {
        Self {
            messaging_enabled: true,
            categories: HashMap::new(),
            updated_at: None,
        }
    }
}

impl ConsentSnapshot {
    pub fn permits(&self, category: MessageCategory) -> bool {
        self.messaging_enabled && self.categories.get(&category).copied().unwrap_or(true)
    }
}

/// Recipient state supplied per processing request. Not owned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub tier_code: String,
    pub activity: ActivitySummary,
    pub consent: ConsentSnapshot,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, tier_code: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tier_code: tier_code.into(),
            activity: ActivitySummary::default(),
            consent: ConsentSnapshot::default(),
        }
    }
}

// ─── Context analysis ───────────────────────────────────────────────────────

/// Symbolic view of recent user activity produced by the context analyzer,
/// or synthesized from the time of day when the analyzer is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolicContext {
    pub tags: Vec<String>,
    pub dominant_activity: String,
    /// Coherence of the activity signal, 0.0..=1.0.
    pub coherence: f32,
    pub tone_hint: Option<String>,
    pub visual_hint: Option<String>,
}

// ─── Attention gating ───────────────────────────────────────────────────────

/// Attention/emotional availability state resolved for a recipient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttentionState {
    // Coarse states reported by a live attention provider.
    Flow,
    Busy,
    Available,
    // States classified by the local heuristic.
    Overwhelmed,
    Focused,
    Relaxed,
    Stressed,
    Neutral,
}

impl std::fmt::Display for AttentionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AttentionState::Flow => "flow",
            AttentionState::Busy => "busy",
            AttentionState::Available => "available",
            AttentionState::Overwhelmed => "overwhelmed",
            AttentionState::Focused => "focused",
            AttentionState::Relaxed => "relaxed",
            AttentionState::Stressed => "stressed",
            AttentionState::Neutral => "neutral",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of the attention gate for one message. Never mutated after
/// creation; a re-submitted message gets a fresh decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionDecision {
    pub approved: bool,
    pub state: AttentionState,
    /// Set when the message is deferred rather than blocked outright.
    pub wake_at: Option<DateTime<Utc>>,
    /// 0.0..=1.0; heuristic decisions carry a fixed, lower confidence.
    pub confidence: f32,
    pub reason: String,
}

// ─── Tier filtering ─────────────────────────────────────────────────────────

/// Presentation richness permitted by the recipient's tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentationLevel {
    Standard,
    Advanced,
}

/// A message after tier feature flags have been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredMessage {
    pub message: Message,
    pub tier_code: String,
    pub ad_eligible: bool,
    pub feedback_required: bool,
    pub presentation: PresentationLevel,
}

// ─── Outcomes ───────────────────────────────────────────────────────────────

/// Opaque handle to a rendered artifact produced by the presentation
/// generator (or its fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub id: Uuid,
    pub kind: String,
    pub uri: Option<String>,
}

/// Terminal result of processing one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Delivered {
        artifact: ArtifactHandle,
    },
    Blocked {
        reason: String,
    },
    Deferred {
        wake_at: DateTime<Utc>,
        reason: String,
    },
}

impl Outcome {
    /// Short label for traces and events.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Delivered { .. } => "delivered",
            Outcome::Blocked { .. } => "blocked",
            Outcome::Deferred { .. } => "deferred",
        }
    }
}

/// What `process` returns to the caller: the outcome plus the per-phase trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub trace: Vec<crate::session::PhaseRecord>,
    pub elapsed_ms: u64,
}

// ─── Deferral ───────────────────────────────────────────────────────────────

/// A deferred message waiting for its wake time, with the recipient state
/// snapshot it will be re-submitted with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredEntry {
    pub message: Message,
    pub context: UserContext,
    pub wake_at: DateTime<Utc>,
    pub retries: u32,
}

// ─── Health surface ─────────────────────────────────────────────────────────

/// Which optional collaborators are live (vs. running on fallbacks).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct IntegrationsAvailable {
    pub context: bool,
    pub attention: bool,
}

/// Point-in-time health snapshot of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub active_deferred: usize,
    pub ready_queue_depth: usize,
    pub avg_processing_ms: f64,
    pub integrations: IntegrationsAvailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_snapshot_defaults_permit() {
        let consent = ConsentSnapshot::default();
        assert!(consent.permits(MessageCategory::Reminder));
        assert!(consent.permits(MessageCategory::Promotional));
    }

    #[test]
    fn test_consent_snapshot_category_opt_out() {
        let mut consent = ConsentSnapshot::default();
        consent.categories.insert(MessageCategory::Promotional, false);
        assert!(!consent.permits(MessageCategory::Promotional));
        assert!(consent.permits(MessageCategory::Reminder));
    }

    #[test]
    fn test_consent_snapshot_global_kill_switch() {
        let consent = ConsentSnapshot {
            messaging_enabled: false,
            ..Default::default()
        };
        assert!(!consent.permits(MessageCategory::Alert));
    }

    #[test]
    fn test_message_expiry() {
        let now = Utc::now();
        let mut msg = Message::new("user-1", MessageCategory::Reminder, 3);
        assert!(!msg.is_expired(now));

        msg.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(msg.is_expired(now));

        msg.expires_at = Some(now + chrono::Duration::minutes(5));
        assert!(!msg.is_expired(now));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = Outcome::Blocked {
            reason: "consent_denied".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "blocked");
        assert_eq!(json["reason"], "consent_denied");
    }
}
