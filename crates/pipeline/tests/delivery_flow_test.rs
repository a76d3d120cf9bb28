//! Integration tests for the full message-delivery decision flow: pipeline
//! scenarios, deferral + scheduler promotion, and the engine facade.

use std::sync::Arc;

use attune_core::config::{AppConfig, GatingConfig, SchedulerConfig};
use attune_core::event_bus::{capture_sink, EventType};
use attune_core::session::{Phase, SessionStore};
use attune_core::types::{Message, MessageCategory, Outcome, UserContext};
use attune_pipeline::{DeliveryEngine, Orchestrator};
use attune_scheduler::{DeferredSet, DeliveryScheduler, ReadyQueue};
use attune_tiering::TierCatalog;
use chrono::{NaiveTime, Utc};

/// Gating config whose work window covers the whole day, so the fallback
/// heuristic deterministically classifies any quiet user as focused.
fn always_focused_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.gating = GatingConfig {
        work_start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        work_end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        ..GatingConfig::default()
    };
    config
}

fn engine() -> DeliveryEngine {
    DeliveryEngine::builder(always_focused_config()).build()
}

#[tokio::test]
async fn test_priority_exception_delivers_during_work_hours() {
    // Priority 5 exceeds the focused exception threshold (4).
    let engine = engine();
    let message = Message::new("user-a", MessageCategory::Alert, 5);
    let context = UserContext::new("user-a", "T2");

    let report = engine.process(message, context).await.unwrap();
    assert!(matches!(report.outcome, Outcome::Delivered { .. }));

    // All five phases ran and were traced.
    assert_eq!(report.trace.len(), 5);
    assert_eq!(report.trace[0].phase, Phase::Consent);
    assert_eq!(report.trace[4].phase, Phase::Handoff);
    // No attention provider registered: the gate ran its heuristic.
    assert!(report.trace[2].fallback_mode);

    let status = engine.status();
    assert_eq!(status.ready_queue_depth, 1);
    assert_eq!(status.active_deferred, 0);
}

#[tokio::test]
async fn test_low_priority_defers_by_two_hours() {
    // Priority 2 during work hours -> deferred with wake = submission + 2h.
    let engine = engine();
    let submitted = Utc::now();
    let message = Message::new("user-b", MessageCategory::Insight, 2);
    let context = UserContext::new("user-b", "T2");

    let report = engine.process(message, context).await.unwrap();
    let Outcome::Deferred { wake_at, .. } = &report.outcome else {
        panic!("expected Deferred, got {:?}", report.outcome.label());
    };

    // Wake time is strictly after submission, about two hours out.
    assert!(*wake_at > submitted);
    let minutes = (*wake_at - submitted).num_minutes();
    assert!((119..=121).contains(&minutes), "wake was {} minutes out", minutes);

    let status = engine.status();
    assert_eq!(status.active_deferred, 1);
    assert_eq!(status.ready_queue_depth, 0);
}

#[tokio::test]
async fn test_daily_cap_blocks_eleventh_message() {
    // Tier T3 allows 10 messages per day; the 11th is blocked with no
    // side effects on the usage counters.
    let engine = engine();

    for i in 0..10 {
        let message = Message::new("user-c", MessageCategory::Reminder, 5);
        let report = engine.process(message, UserContext::new("user-c", "T3")).await.unwrap();
        assert!(
            matches!(report.outcome, Outcome::Delivered { .. }),
            "message {} should deliver",
            i
        );
    }

    let eleventh = Message::new("user-c", MessageCategory::Reminder, 5);
    let report = engine.process(eleventh, UserContext::new("user-c", "T3")).await.unwrap();
    let Outcome::Blocked { reason } = &report.outcome else {
        panic!("expected Blocked, got {:?}", report.outcome.label());
    };
    assert_eq!(reason, "cap_exceeded");

    // The blocked attempt consumed nothing: a 12th try fails identically.
    let twelfth = Message::new("user-c", MessageCategory::Reminder, 5);
    let report = engine.process(twelfth, UserContext::new("user-c", "T3")).await.unwrap();
    assert!(matches!(report.outcome, Outcome::Blocked { .. }));
}

#[tokio::test]
async fn test_promoted_message_reenters_pipeline_from_the_start() {
    // A deferred message re-submitted at its wake time runs all phases
    // again and produces a fresh, independent trace.
    let sink = capture_sink();
    let ready = Arc::new(ReadyQueue::new());
    let deferred = Arc::new(DeferredSet::new());
    let sessions = Arc::new(SessionStore::new());
    let orchestrator = Arc::new(
        Orchestrator::new(
            always_focused_config().gating,
            Arc::new(TierCatalog::with_defaults()),
            deferred.clone(),
            ready.clone(),
            sessions.clone(),
        )
        .with_event_sink(sink.clone()),
    );
    let scheduler = DeliveryScheduler::new(
        ready,
        deferred.clone(),
        sessions,
        orchestrator.clone(),
        sink.clone(),
        SchedulerConfig::default(),
    );

    let message = Message::new("user-d", MessageCategory::Insight, 2);
    let message_id = message.id;
    let context = UserContext::new("user-d", "T2");

    let report = orchestrator.process_message(message, context).await.unwrap();
    assert!(matches!(report.outcome, Outcome::Deferred { .. }));
    assert!(deferred.contains(&message_id));

    // Rewind the entry's wake time so the next tick finds it due.
    let mut entry = deferred.cancel(&message_id).unwrap();
    entry.wake_at = Utc::now() - chrono::Duration::seconds(1);
    deferred.insert(entry);

    let promoted = scheduler.promote_due().await;
    assert_eq!(promoted, 1);

    // The re-run admitted the message again from the start.
    assert_eq!(sink.count_type(EventType::MessageAdmitted), 2);
    assert_eq!(sink.count_type(EventType::DeferredPromoted), 1);

    // With unchanged context it deferred again, as a brand-new entry.
    assert_eq!(sink.count_type(EventType::MessageDeferred), 2);
    assert!(deferred.contains(&message_id));
    let entry = deferred.cancel(&message_id).unwrap();
    assert_eq!(entry.retries, 0);
    assert!(entry.wake_at > Utc::now());
}

#[tokio::test]
async fn test_fallbacks_still_produce_terminal_outcome() {
    // With no context analyzer and no attention provider, processing
    // completes in-call on heuristics alone.
    let engine = engine();
    let message = Message::new("user-e", MessageCategory::Encouragement, 5);

    let report = engine.process(message, UserContext::new("user-e", "T1")).await.unwrap();
    assert!(matches!(report.outcome, Outcome::Delivered { .. }));

    let context_phase = report
        .trace
        .iter()
        .find(|p| p.phase == Phase::ContextAnalysis)
        .unwrap();
    assert!(context_phase.fallback_mode);
    let gating_phase = report
        .trace
        .iter()
        .find(|p| p.phase == Phase::AttentionGating)
        .unwrap();
    assert!(gating_phase.fallback_mode);

    let status = engine.status();
    assert!(!status.integrations.context);
    assert!(!status.integrations.attention);
}

#[tokio::test]
async fn test_consent_denied_short_circuits() {
    let engine = engine();
    let message = Message::new("user-f", MessageCategory::Promotional, 5);
    let mut context = UserContext::new("user-f", "T2");
    context
        .consent
        .categories
        .insert(MessageCategory::Promotional, false);

    let report = engine.process(message, context).await.unwrap();
    let Outcome::Blocked { reason } = &report.outcome else {
        panic!("expected Blocked");
    };
    assert_eq!(reason, "consent_denied");
    // Nothing past the consent phase ran.
    assert_eq!(report.trace.len(), 1);
    assert_eq!(report.trace[0].phase, Phase::Consent);
}

#[tokio::test]
async fn test_malformed_input_is_rejected_before_any_phase() {
    let engine = engine();

    // Mismatched user ids.
    let message = Message::new("user-g", MessageCategory::Reminder, 3);
    let result = engine.process(message, UserContext::new("someone-else", "T1")).await;
    assert!(result.is_err());

    // Already-expired message.
    let mut message = Message::new("user-g", MessageCategory::Reminder, 3);
    message.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
    let result = engine.process(message, UserContext::new("user-g", "T1")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_message_sits_in_at_most_one_queue() {
    let engine = engine();

    // Deferred: in the deferred set, not the ready queue.
    let deferred_msg = Message::new("user-h", MessageCategory::Digest, 1);
    engine.process(deferred_msg, UserContext::new("user-h", "T2")).await.unwrap();
    let status = engine.status();
    assert_eq!(status.active_deferred, 1);
    assert_eq!(status.ready_queue_depth, 0);

    // Delivered: in the ready queue, not the deferred set.
    let delivered_msg = Message::new("user-h", MessageCategory::Alert, 6);
    engine.process(delivered_msg, UserContext::new("user-h", "T2")).await.unwrap();
    let status = engine.status();
    assert_eq!(status.active_deferred, 1);
    assert_eq!(status.ready_queue_depth, 1);
}

#[tokio::test]
async fn test_revoking_a_user_cancels_their_deferred_messages() {
    let engine = engine();

    let message = Message::new("user-i", MessageCategory::Insight, 2);
    engine.process(message, UserContext::new("user-i", "T2")).await.unwrap();
    assert_eq!(engine.status().active_deferred, 1);

    let cancelled = engine.revoke_user("user-i");
    assert_eq!(cancelled, 1);
    assert_eq!(engine.status().active_deferred, 0);
}

#[tokio::test]
async fn test_optimal_timing_message_waits_for_a_window() {
    let engine = engine();

    let mut message = Message::new("user-j", MessageCategory::Encouragement, 6);
    message.special = true;
    let report = engine.process(message, UserContext::new("user-j", "T3")).await.unwrap();
    assert!(matches!(report.outcome, Outcome::Delivered { .. }));
    assert_eq!(engine.status().ready_queue_depth, 1);

    // Outside every bio-rhythm window the item is held, not dropped.
    let afternoon = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
    assert_eq!(engine.scheduler().dispatch_ready_at(Utc::now(), afternoon), 0);
    assert_eq!(engine.status().ready_queue_depth, 1);

    // Inside the morning peak it dispatches.
    let morning = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
    assert_eq!(engine.scheduler().dispatch_ready_at(Utc::now(), morning), 1);
    assert_eq!(engine.status().ready_queue_depth, 0);
}
