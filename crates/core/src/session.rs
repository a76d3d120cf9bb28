//! Per-message processing sessions — the observability trace of which phases
//! ran, in integrated or fallback mode, and with what outcome. Sessions are
//! retained only for a bounded time; an eviction loop removes idle ones.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Consent,
    ContextAnalysis,
    AttentionGating,
    TierFilter,
    Handoff,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Phase::Consent => "consent",
            Phase::ContextAnalysis => "context_analysis",
            Phase::AttentionGating => "attention_gating",
            Phase::TierFilter => "tier_filter",
            Phase::Handoff => "handoff",
        };
        write!(f, "{}", label)
    }
}

/// Record of a single executed phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub duration_ms: u64,
    pub fallback_mode: bool,
    pub summary: String,
}

/// Trace of one message's trip through the pipeline. Created at pipeline
/// entry, finalized at pipeline exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSession {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: String,
    pub phases: Vec<PhaseRecord>,
    pub outcome: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub total_ms: Option<u64>,
}

/// How many finalized durations feed the rolling processing-time average.
const AVG_WINDOW: usize = 256;

/// In-memory session store with idle eviction and a rolling latency window.
pub struct SessionStore {
    sessions: DashMap<Uuid, ProcessingSession>,
    finalized_ms: Mutex<VecDeque<u64>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            finalized_ms: Mutex::new(VecDeque::with_capacity(AVG_WINDOW)),
        }
    }

    /// Open a session for a newly admitted message. Returns the session id.
    pub fn begin(&self, message_id: Uuid, user_id: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.sessions.insert(
            id,
            ProcessingSession {
                id,
                message_id,
                user_id: user_id.to_string(),
                phases: Vec::new(),
                outcome: None,
                started_at: now,
                last_activity: now,
                total_ms: None,
            },
        );
        id
    }

    /// Append a phase record to an open session.
    pub fn record_phase(&self, session_id: Uuid, record: PhaseRecord) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.phases.push(record);
            session.last_activity = Utc::now();
        }
    }

    /// Finalize a session with its outcome label and return a snapshot of it.
    /// The session stays in the store for observability until evicted.
    pub fn finalize(&self, session_id: Uuid, outcome: &str) -> Option<ProcessingSession> {
        let snapshot = {
            let mut session = self.sessions.get_mut(&session_id)?;
            let now = Utc::now();
            let total = now
                .signed_duration_since(session.started_at)
                .num_milliseconds()
                .max(0) as u64;
            session.outcome = Some(outcome.to_string());
            session.total_ms = Some(total);
            session.last_activity = now;
            session.clone()
        };

        let mut window = self.finalized_ms.lock();
        if window.len() == AVG_WINDOW {
            window.pop_front();
        }
        window.push_back(snapshot.total_ms.unwrap_or(0));

        Some(snapshot)
    }

    pub fn get(&self, session_id: &Uuid) -> Option<ProcessingSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Rolling average total processing time in milliseconds.
    pub fn avg_processing_ms(&self) -> f64 {
        let window = self.finalized_ms.lock();
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<u64>() as f64 / window.len() as f64
    }

    /// Remove sessions idle longer than `idle_timeout`. Returns the evicted
    /// sessions so the caller can emit events for them.
    pub fn evict_idle(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> Vec<ProcessingSession> {
        let cutoff = now - idle_timeout;
        let stale: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().last_activity < cutoff)
            .map(|entry| *entry.key())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id).map(|(_, s)| s))
            .collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
