//! The delivery scheduler — owns the ready queue and deferred set, promotes
//! deferred messages when their wake time elapses, dispatches ready items
//! in priority order with bio-rhythm gating, and evicts idle sessions.

use std::sync::Arc;
use std::time::Duration;

use attune_core::collab::MessageProcessor;
use attune_core::config::SchedulerConfig;
use attune_core::event_bus::{make_event, EventSink, EventType};
use attune_core::session::SessionStore;
use attune_core::types::DeferredEntry;
use chrono::{DateTime, Local, NaiveTime, Utc};
use tracing::{debug, info, warn};

use crate::biorhythm;
use crate::deferred::DeferredSet;
use crate::ready::ReadyQueue;
use crate::supervisor::Supervisor;

pub struct DeliveryScheduler {
    ready: Arc<ReadyQueue>,
    deferred: Arc<DeferredSet>,
    sessions: Arc<SessionStore>,
    processor: Arc<dyn MessageProcessor>,
    events: Arc<dyn EventSink>,
    config: SchedulerConfig,
}

impl DeliveryScheduler {
    pub fn new(
        ready: Arc<ReadyQueue>,
        deferred: Arc<DeferredSet>,
        sessions: Arc<SessionStore>,
        processor: Arc<dyn MessageProcessor>,
        events: Arc<dyn EventSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            ready,
            deferred,
            sessions,
            processor,
            events,
            config,
        }
    }

    pub fn ready_depth(&self) -> usize {
        self.ready.len()
    }

    pub fn active_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// One promotion tick: re-submit every due deferred entry through the
    /// full pipeline exactly once. A failing entry is retried on later
    /// ticks up to the configured limit, then dropped.
    pub async fn promote_due(&self) -> usize {
        let now = Utc::now();
        let due = self.deferred.due(now);
        if due.is_empty() {
            return 0;
        }

        debug!(count = due.len(), "promoting due deferred entries");
        let mut promoted = 0usize;

        for mut entry in due {
            let message_id = entry.message.id;
            let user_id = entry.message.user_id.clone();

            match self
                .processor
                .process(entry.message.clone(), entry.context.clone())
                .await
            {
                Ok(report) => {
                    promoted += 1;
                    metrics::counter!("scheduler.deferred_promoted").increment(1);
                    self.events.emit(make_event(
                        EventType::DeferredPromoted,
                        Some(message_id),
                        Some(user_id),
                        Some(report.outcome.label().to_string()),
                    ));
                }
                Err(e) => {
                    entry.retries += 1;
                    if entry.retries > self.config.max_deferred_retries {
                        warn!(
                            message_id = %message_id,
                            retries = entry.retries,
                            error = %e,
                            "deferred entry exhausted retries, dropping"
                        );
                        metrics::counter!("scheduler.deferred_dropped").increment(1);
                        self.events.emit(make_event(
                            EventType::DeferredDropped,
                            Some(message_id),
                            Some(user_id),
                            Some(e.to_string()),
                        ));
                    } else {
                        warn!(
                            message_id = %message_id,
                            retries = entry.retries,
                            error = %e,
                            "deferred re-submission failed, will retry"
                        );
                        entry.wake_at = now
                            + chrono::Duration::seconds(self.config.promotion_interval_secs as i64);
                        self.deferred.insert(entry);
                    }
                }
            }
        }

        promoted
    }

    /// One dispatch tick at the current wall clock.
    pub fn dispatch_ready(&self) -> usize {
        self.dispatch_ready_at(Utc::now(), Local::now().time())
    }

    /// Dispatch up to a batch of ready items. Expired items are dropped;
    /// optimal-timing items outside every bio-rhythm window are re-queued
    /// for the next tick rather than dropped.
    pub fn dispatch_ready_at(&self, now: DateTime<Utc>, local_time: NaiveTime) -> usize {
        let mut dispatched = 0usize;
        let mut held = Vec::new();

        for _ in 0..self.config.dispatch_batch {
            let Some(item) = self.ready.pop() else { break };
            let message = &item.filtered.message;

            if message.is_expired(now) {
                debug!(message_id = %message.id, "dropping expired ready message");
                metrics::counter!("scheduler.expired").increment(1);
                self.events.emit(make_event(
                    EventType::MessageExpired,
                    Some(message.id),
                    Some(message.user_id.clone()),
                    None,
                ));
                continue;
            }

            if message.special {
                match biorhythm::active_window(local_time) {
                    Some(window) => self.dispatch(item, Some(window.label())),
                    None => {
                        held.push(item);
                        continue;
                    }
                }
            } else {
                self.dispatch(item, None);
            }
            dispatched += 1;
        }

        for item in held {
            self.ready.requeue(item);
        }

        dispatched
    }

    fn dispatch(&self, item: crate::ready::ReadyItem, window: Option<&'static str>) {
        let message = &item.filtered.message;
        debug!(
            message_id = %message.id,
            user_id = %message.user_id,
            priority = item.effective_priority,
            window = window.unwrap_or("immediate"),
            "dispatching message"
        );
        metrics::counter!("scheduler.dispatched").increment(1);
        self.events.emit(make_event(
            EventType::MessageDispatched,
            Some(message.id),
            Some(message.user_id.clone()),
            window.map(|w| w.to_string()),
        ));
    }

    /// One eviction tick: finalize and drop sessions idle past the timeout.
    /// Never touches the ready queue or deferred set.
    pub fn evict_idle_sessions(&self) -> usize {
        let timeout = chrono::Duration::seconds(self.config.session_idle_timeout_secs as i64);
        let evicted = self.sessions.evict_idle(Utc::now(), timeout);

        for session in &evicted {
            self.events.emit(make_event(
                EventType::SessionEvicted,
                Some(session.message_id),
                Some(session.user_id.clone()),
                session.outcome.clone(),
            ));
        }

        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted idle sessions");
            metrics::counter!("scheduler.sessions_evicted").increment(evicted.len() as u64);
        }
        evicted.len()
    }

    /// Cancel a user's deferred messages (e.g. consent revoked). Returns
    /// how many entries were dropped.
    pub fn cancel_deferred_for_user(&self, user_id: &str) -> usize {
        let cancelled = self.deferred.cancel_user(user_id);
        for entry in &cancelled {
            self.events.emit(make_event(
                EventType::DeferredCancelled,
                Some(entry.message.id),
                Some(user_id.to_string()),
                None,
            ));
        }
        cancelled.len()
    }

    /// Spawn the promotion, dispatch, and eviction loops under the given
    /// supervisor.
    pub fn spawn_loops(self: &Arc<Self>, supervisor: &Supervisor) {
        let promotion_period = Duration::from_secs(self.config.promotion_interval_secs);
        let eviction_period = Duration::from_secs(self.config.eviction_interval_secs);

        let scheduler = self.clone();
        supervisor.spawn_periodic("deferred-promotion", promotion_period, move || {
            let scheduler = scheduler.clone();
            async move {
                scheduler.promote_due().await;
                Ok(())
            }
        });

        let scheduler = self.clone();
        supervisor.spawn_periodic("ready-dispatch", promotion_period, move || {
            let scheduler = scheduler.clone();
            async move {
                scheduler.dispatch_ready();
                Ok(())
            }
        });

        let scheduler = self.clone();
        supervisor.spawn_periodic("session-eviction", eviction_period, move || {
            let scheduler = scheduler.clone();
            async move {
                scheduler.evict_idle_sessions();
                Ok(())
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use attune_core::error::EngineError;
    use attune_core::event_bus::capture_sink;
    use attune_core::types::{
        ArtifactHandle, DeferredEntry, FilteredMessage, Message, MessageCategory, Outcome,
        PresentationLevel, ProcessReport, UserContext,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct CountingProcessor {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl MessageProcessor for CountingProcessor {
        async fn process(
            &self,
            message: Message,
            _context: UserContext,
        ) -> Result<ProcessReport, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::Validation("bad entry".to_string()));
            }
            Ok(ProcessReport {
                outcome: Outcome::Delivered {
                    artifact: ArtifactHandle {
                        id: Uuid::new_v4(),
                        kind: "text".to_string(),
                        uri: None,
                    },
                },
                trace: Vec::new(),
                elapsed_ms: 1,
            })
        }
    }

    fn scheduler_with(
        fail: bool,
    ) -> (
        Arc<DeliveryScheduler>,
        Arc<DeferredSet>,
        Arc<ReadyQueue>,
        Arc<CountingProcessor>,
        Arc<attune_core::event_bus::CaptureSink>,
    ) {
        let ready = Arc::new(ReadyQueue::new());
        let deferred = Arc::new(DeferredSet::new());
        let sessions = Arc::new(SessionStore::new());
        let processor = Arc::new(CountingProcessor {
            calls: AtomicU32::new(0),
            fail,
        });
        let sink = capture_sink();
        let scheduler = Arc::new(DeliveryScheduler::new(
            ready.clone(),
            deferred.clone(),
            sessions,
            processor.clone(),
            sink.clone(),
            SchedulerConfig::default(),
        ));
        (scheduler, deferred, ready, processor, sink)
    }

    fn deferred_entry(wake_in_secs: i64) -> DeferredEntry {
        DeferredEntry {
            message: Message::new("user-1", MessageCategory::Reminder, 3),
            context: UserContext::new("user-1", "T2"),
            wake_at: Utc::now() + chrono::Duration::seconds(wake_in_secs),
            retries: 0,
        }
    }

    fn ready_item(special: bool) -> (FilteredMessage, ArtifactHandle) {
        let mut message = Message::new("user-1", MessageCategory::Encouragement, 4);
        message.special = special;
        (
            FilteredMessage {
                message,
                tier_code: "T2".to_string(),
                ad_eligible: false,
                feedback_required: false,
                presentation: PresentationLevel::Standard,
            },
            ArtifactHandle {
                id: Uuid::new_v4(),
                kind: "text".to_string(),
                uri: None,
            },
        )
    }

    #[tokio::test]
    async fn test_promotes_only_due_entries() {
        let (scheduler, deferred, _, processor, _) = scheduler_with(false);

        deferred.insert(deferred_entry(-1));
        deferred.insert(deferred_entry(3600));

        let promoted = scheduler.promote_due().await;
        assert_eq!(promoted, 1);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(deferred.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_entry_retried_then_dropped() {
        let (scheduler, deferred, _, processor, sink) = scheduler_with(true);

        let mut entry = deferred_entry(-1);
        entry.retries = SchedulerConfig::default().max_deferred_retries;
        deferred.insert(entry);

        let promoted = scheduler.promote_due().await;
        assert_eq!(promoted, 0);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        // Retry budget exhausted: dropped, not re-deferred.
        assert!(deferred.is_empty());
        assert_eq!(sink.count_type(EventType::DeferredDropped), 1);
    }

    #[tokio::test]
    async fn test_failing_entry_requeued_within_budget() {
        let (scheduler, deferred, _, _, sink) = scheduler_with(true);

        deferred.insert(deferred_entry(-1));
        scheduler.promote_due().await;

        // Entry went back into the set with a pushed-out wake time.
        assert_eq!(deferred.len(), 1);
        assert_eq!(sink.count_type(EventType::DeferredDropped), 0);
    }

    #[tokio::test]
    async fn test_dispatch_holds_special_messages_outside_windows() {
        let (scheduler, _, ready, _, sink) = scheduler_with(false);

        let (filtered, artifact) = ready_item(true);
        ready.push(filtered, artifact, 4);

        // 15:00 is outside every bio-rhythm window.
        let afternoon = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
        let dispatched = scheduler.dispatch_ready_at(Utc::now(), afternoon);
        assert_eq!(dispatched, 0);
        assert_eq!(ready.len(), 1);

        // 20:00 falls in the evening wind-down window.
        let evening = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        let dispatched = scheduler.dispatch_ready_at(Utc::now(), evening);
        assert_eq!(dispatched, 1);
        assert!(ready.is_empty());
        assert_eq!(sink.count_type(EventType::MessageDispatched), 1);
    }

    #[tokio::test]
    async fn test_dispatch_drops_expired_messages() {
        let (scheduler, _, ready, _, sink) = scheduler_with(false);

        let (mut filtered, artifact) = ready_item(false);
        filtered.message.expires_at = Some(Utc::now() - chrono::Duration::seconds(10));
        ready.push(filtered, artifact, 4);

        let noon = NaiveTime::from_hms_opt(12, 30, 0).unwrap();
        let dispatched = scheduler.dispatch_ready_at(Utc::now(), noon);
        assert_eq!(dispatched, 0);
        assert!(ready.is_empty());
        assert_eq!(sink.count_type(EventType::MessageExpired), 1);
    }
}
