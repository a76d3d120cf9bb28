use chrono::NaiveTime;
use serde::Deserialize;

/// Root engine configuration. Loaded from environment variables with the
/// prefix `ATTUNE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub gating: GatingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Tunables for the attention gate's heuristic fallback and its per-state
/// deferral exceptions.
#[derive(Debug, Clone, Deserialize)]
pub struct GatingConfig {
    #[serde(default = "default_work_start")]
    pub work_start: NaiveTime,
    #[serde(default = "default_work_end")]
    pub work_end: NaiveTime,
    #[serde(default = "default_evening_start")]
    pub evening_start: NaiveTime,
    #[serde(default = "default_evening_end")]
    pub evening_end: NaiveTime,
    /// Events in the last hour above which the user counts as overwhelmed.
    #[serde(default = "default_activity_threshold")]
    pub activity_threshold: u32,
    #[serde(default = "default_overwhelmed_defer_hours")]
    pub overwhelmed_defer_hours: i64,
    #[serde(default = "default_focused_defer_hours")]
    pub focused_defer_hours: i64,
    #[serde(default = "default_stressed_defer_hours")]
    pub stressed_defer_hours: i64,
    /// Priority at or above which a message bypasses an overwhelmed deferral.
    #[serde(default = "default_overwhelmed_exception_priority")]
    pub overwhelmed_exception_priority: u8,
    /// Priority at or above which a message bypasses a focused deferral.
    #[serde(default = "default_focused_exception_priority")]
    pub focused_exception_priority: u8,
    /// Priority at or above which a message interrupts a flow state.
    #[serde(default = "default_flow_exception_priority")]
    pub flow_exception_priority: u8,
    /// Priority at or above which a message interrupts a busy state.
    #[serde(default = "default_busy_exception_priority")]
    pub busy_exception_priority: u8,
    /// Fixed confidence attached to heuristic decisions.
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f32,
}

/// Tunables for the background scheduler loops.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_promotion_interval_secs")]
    pub promotion_interval_secs: u64,
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
    /// How often a failing deferred entry is retried before being dropped.
    #[serde(default = "default_max_deferred_retries")]
    pub max_deferred_retries: u32,
    /// Ready items popped per dispatch tick.
    #[serde(default = "default_dispatch_batch")]
    pub dispatch_batch: usize,
}

// Default functions
fn default_node_id() -> String {
    "attune-01".to_string()
}
fn default_work_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}
fn default_work_end() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default()
}
fn default_evening_start() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default()
}
fn default_evening_end() -> NaiveTime {
    NaiveTime::from_hms_opt(21, 0, 0).unwrap_or_default()
}
fn default_activity_threshold() -> u32 {
    30
}
fn default_overwhelmed_defer_hours() -> i64 {
    8
}
fn default_focused_defer_hours() -> i64 {
    2
}
fn default_stressed_defer_hours() -> i64 {
    4
}
fn default_overwhelmed_exception_priority() -> u8 {
    5
}
fn default_focused_exception_priority() -> u8 {
    4
}
fn default_flow_exception_priority() -> u8 {
    8
}
fn default_busy_exception_priority() -> u8 {
    6
}
fn default_fallback_confidence() -> f32 {
    0.6
}
fn default_promotion_interval_secs() -> u64 {
    10
}
fn default_eviction_interval_secs() -> u64 {
    60
}
fn default_session_idle_timeout_secs() -> u64 {
    1800
}
fn default_max_deferred_retries() -> u32 {
    3
}
fn default_dispatch_batch() -> usize {
    32
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            work_start: default_work_start(),
            work_end: default_work_end(),
            evening_start: default_evening_start(),
            evening_end: default_evening_end(),
            activity_threshold: default_activity_threshold(),
            overwhelmed_defer_hours: default_overwhelmed_defer_hours(),
            focused_defer_hours: default_focused_defer_hours(),
            stressed_defer_hours: default_stressed_defer_hours(),
            overwhelmed_exception_priority: default_overwhelmed_exception_priority(),
            focused_exception_priority: default_focused_exception_priority(),
            flow_exception_priority: default_flow_exception_priority(),
            busy_exception_priority: default_busy_exception_priority(),
            fallback_confidence: default_fallback_confidence(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            promotion_interval_secs: default_promotion_interval_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            max_deferred_retries: default_max_deferred_retries(),
            dispatch_batch: default_dispatch_batch(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            gating: GatingConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ATTUNE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_windows() {
        let cfg = GatingConfig::default();
        assert_eq!(cfg.work_start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(cfg.work_end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(cfg.evening_end, NaiveTime::from_hms_opt(21, 0, 0).unwrap());
        assert_eq!(cfg.focused_defer_hours, 2);
        assert_eq!(cfg.overwhelmed_defer_hours, 8);
        assert_eq!(cfg.focused_exception_priority, 4);
        assert_eq!(cfg.overwhelmed_exception_priority, 5);
    }

    #[test]
    fn test_scheduler_defaults() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.promotion_interval_secs, 10);
        assert_eq!(cfg.eviction_interval_secs, 60);
        assert_eq!(cfg.session_idle_timeout_secs, 1800);
    }
}
