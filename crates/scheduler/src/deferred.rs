//! Deferred set — messages held back until a future wake time, keyed by
//! message id so a message can sit in at most one place at a time.

use attune_core::types::DeferredEntry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct DeferredSet {
    entries: DashMap<Uuid, DeferredEntry>,
}

impl DeferredSet {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert an entry. Wake times are expected to be in the future; an
    /// already-elapsed wake is tolerated and simply promotes on the next tick.
    pub fn insert(&self, entry: DeferredEntry) {
        if entry.wake_at <= Utc::now() {
            warn!(
                message_id = %entry.message.id,
                wake_at = %entry.wake_at,
                "deferred entry inserted with elapsed wake time"
            );
        }
        if let Some(previous) = self.entries.insert(entry.message.id, entry) {
            warn!(
                message_id = %previous.message.id,
                "replaced existing deferred entry for message"
            );
        }
    }

    /// Remove and return every entry whose wake time has elapsed. Entries
    /// not yet due are untouched.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<DeferredEntry> {
        let due_ids: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|e| e.value().wake_at <= now)
            .map(|e| *e.key())
            .collect();

        due_ids
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(_, entry)| entry))
            .collect()
    }

    /// Cancel a single deferred message before its wake time.
    pub fn cancel(&self, message_id: &Uuid) -> Option<DeferredEntry> {
        let removed = self.entries.remove(message_id).map(|(_, e)| e);
        if removed.is_some() {
            debug!(message_id = %message_id, "deferred entry cancelled");
        }
        removed
    }

    /// Cancel every deferred message for one user (e.g. consent revoked).
    pub fn cancel_user(&self, user_id: &str) -> Vec<DeferredEntry> {
        let ids: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|e| e.value().message.user_id == user_id)
            .map(|e| *e.key())
            .collect();

        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(_, e)| e))
            .collect()
    }

    pub fn contains(&self, message_id: &Uuid) -> bool {
        self.entries.contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DeferredSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attune_core::types::{Message, MessageCategory, UserContext};
    use chrono::Duration;

    fn entry(user: &str, wake_in_secs: i64) -> DeferredEntry {
        DeferredEntry {
            message: Message::new(user, MessageCategory::Reminder, 3),
            context: UserContext::new(user, "T2"),
            wake_at: Utc::now() + Duration::seconds(wake_in_secs),
            retries: 0,
        }
    }

    #[test]
    fn test_due_only_returns_elapsed_entries() {
        let set = DeferredSet::new();
        let past = entry("user-1", -5);
        let future = entry("user-2", 3600);
        let past_id = past.message.id;
        let future_id = future.message.id;

        set.insert(past);
        set.insert(future);

        let due = set.due(Utc::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].message.id, past_id);
        assert!(set.contains(&future_id));
        assert!(!set.contains(&past_id));
    }

    #[test]
    fn test_not_promoted_before_wake_time() {
        let set = DeferredSet::new();
        let e = entry("user-1", 3600);
        let wake = e.wake_at;
        set.insert(e);

        // Any tick strictly before the wake time leaves the entry alone.
        let just_before = wake - Duration::seconds(1);
        assert!(set.due(just_before).is_empty());
        assert_eq!(set.len(), 1);

        // At the wake time it promotes.
        assert_eq!(set.due(wake).len(), 1);
    }

    #[test]
    fn test_cancel_user_drops_all_their_entries() {
        let set = DeferredSet::new();
        set.insert(entry("user-1", 3600));
        set.insert(entry("user-1", 7200));
        set.insert(entry("user-2", 3600));

        let cancelled = set.cancel_user("user-1");
        assert_eq!(cancelled.len(), 2);
        assert_eq!(set.len(), 1);
    }
}
