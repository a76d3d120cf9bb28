//! Deterministic availability heuristics used when no attention provider is
//! live. Classification looks only at local signals: recent activity volume
//! and the local time of day.

use attune_core::config::GatingConfig;
use attune_core::types::{
    ActivitySummary, AttentionDecision, AttentionState, Message, SymbolicContext, UserContext,
};
use chrono::{DateTime, Duration, NaiveTime, Utc};

/// True if `at` falls inside [start, end), handling windows that wrap
/// past midnight.
pub fn in_window(at: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        at >= start && at < end
    } else {
        at >= start || at < end
    }
}

/// Classify the recipient's availability from local signals only.
///
/// Activity volume dominates the time-of-day windows: a user firing events
/// above the threshold is overwhelmed no matter the hour.
pub fn classify(activity: &ActivitySummary, local_time: NaiveTime, cfg: &GatingConfig) -> AttentionState {
    if activity.events_last_hour > cfg.activity_threshold {
        AttentionState::Overwhelmed
    } else if in_window(local_time, cfg.work_start, cfg.work_end) {
        AttentionState::Focused
    } else if in_window(local_time, cfg.evening_start, cfg.evening_end) {
        AttentionState::Relaxed
    } else {
        AttentionState::Neutral
    }
}

/// How long a deferral for `state` should wait, if that state defers at all.
pub fn defer_duration(state: AttentionState, cfg: &GatingConfig) -> Option<Duration> {
    match state {
        AttentionState::Overwhelmed => Some(Duration::hours(cfg.overwhelmed_defer_hours)),
        AttentionState::Focused => Some(Duration::hours(cfg.focused_defer_hours)),
        AttentionState::Stressed => Some(Duration::hours(cfg.stressed_defer_hours)),
        _ => None,
    }
}

/// Priority bump applied when the recipient is receptive.
pub fn priority_boost(state: AttentionState) -> u8 {
    match state {
        AttentionState::Relaxed => 1,
        _ => 0,
    }
}

/// Full heuristic decision at an explicit clock time. `local_time` drives
/// classification, `now` anchors any wake time.
pub fn decide(
    message: &Message,
    ctx: &UserContext,
    local_time: NaiveTime,
    now: DateTime<Utc>,
    cfg: &GatingConfig,
) -> AttentionDecision {
    let state = classify(&ctx.activity, local_time, cfg);

    match state {
        AttentionState::Overwhelmed => {
            if message.priority >= cfg.overwhelmed_exception_priority {
                approve(
                    state,
                    cfg,
                    format!(
                        "priority {} overrides overwhelmed state ({} events in the last hour)",
                        message.priority, ctx.activity.events_last_hour
                    ),
                )
            } else {
                defer(
                    state,
                    now,
                    cfg,
                    format!(
                        "high recent activity ({} events in the last hour)",
                        ctx.activity.events_last_hour
                    ),
                )
            }
        }
        AttentionState::Focused => {
            if message.priority >= cfg.focused_exception_priority {
                approve(
                    state,
                    cfg,
                    format!("priority {} overrides work-hours focus", message.priority),
                )
            } else {
                defer(state, now, cfg, "inside configured work window".to_string())
            }
        }
        AttentionState::Relaxed => approve(
            state,
            cfg,
            "evening wind-down, receptive to messages".to_string(),
        ),
        _ => approve(state, cfg, "no contraindicating signal".to_string()),
    }
}

/// Synthesize a degraded context from the time of day alone, used when the
/// context analyzer is unavailable. Deterministic for a given hour.
pub fn degraded_context(local_time: NaiveTime) -> SymbolicContext {
    use chrono::Timelike;

    let (tag, activity, tone) = match local_time.hour() {
        5..=8 => ("morning_routine", "starting_the_day", "gentle"),
        9..=16 => ("daytime_block", "working", "brief"),
        17..=20 => ("evening_unwind", "winding_down", "warm"),
        _ => ("late_hours", "resting", "quiet"),
    };

    SymbolicContext {
        tags: vec![tag.to_string()],
        dominant_activity: activity.to_string(),
        coherence: 0.4,
        tone_hint: Some(tone.to_string()),
        visual_hint: None,
    }
}

fn approve(state: AttentionState, cfg: &GatingConfig, reason: String) -> AttentionDecision {
    AttentionDecision {
        approved: true,
        state,
        wake_at: None,
        confidence: cfg.fallback_confidence,
        reason,
    }
}

fn defer(
    state: AttentionState,
    now: DateTime<Utc>,
    cfg: &GatingConfig,
    reason: String,
) -> AttentionDecision {
    // States without a defer duration block outright.
    let wake_at = defer_duration(state, cfg).map(|d| now + d);
    AttentionDecision {
        approved: false,
        state,
        wake_at,
        confidence: cfg.fallback_confidence,
        reason,
    }
}
