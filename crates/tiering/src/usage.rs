//! Per-user rolling usage counters backing the tier caps.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::catalog::TierConfig;

/// A cap window that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapWindow {
    Daily,
    Monthly,
}

impl std::fmt::Display for CapWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapWindow::Daily => write!(f, "daily"),
            CapWindow::Monthly => write!(f, "monthly"),
        }
    }
}

/// Rolling per-user delivery timestamps, counted against daily and monthly
/// windows. Checking is read-only; recording happens only after a
/// successful delivery handoff.
pub struct UsageTracker {
    history: DashMap<String, Vec<DateTime<Utc>>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            history: DashMap::new(),
        }
    }

    /// Count deliveries for `user_id` since `window_start`.
    fn count_since(&self, user_id: &str, window_start: DateTime<Utc>) -> u32 {
        self.history
            .get(user_id)
            .map(|h| h.iter().filter(|t| **t >= window_start).count() as u32)
            .unwrap_or(0)
    }

    /// Check both cap windows without side effects. Returns the first
    /// window that is at or over its cap, if any.
    pub fn exceeded_window(&self, user_id: &str, config: &TierConfig) -> Option<(CapWindow, u32)> {
        let now = Utc::now();
        let daily = self.count_since(user_id, now - Duration::days(1));
        if daily >= config.daily_cap {
            return Some((CapWindow::Daily, config.daily_cap));
        }
        let monthly = self.count_since(user_id, now - Duration::days(30));
        if monthly >= config.monthly_cap {
            return Some((CapWindow::Monthly, config.monthly_cap));
        }
        None
    }

    /// Record one delivery for `user_id`, pruning timestamps that have aged
    /// out of every window.
    pub fn record(&self, user_id: &str) {
        let now = Utc::now();
        let horizon = now - Duration::days(31);
        let mut entry = self.history.entry(user_id.to_string()).or_default();
        entry.retain(|t| *t >= horizon);
        entry.push(now);
    }

    pub fn daily_count(&self, user_id: &str) -> u32 {
        self.count_since(user_id, Utc::now() - Duration::days(1))
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}
