//! Named time-of-day dispatch windows for optimal-timing messages.

use chrono::NaiveTime;
use serde::Serialize;

/// A dispatch window during which optimal-timing messages may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmWindow {
    MorningPeak,
    MiddayReset,
    EveningWindDown,
}

impl RhythmWindow {
    pub const ALL: [RhythmWindow; 3] = [
        RhythmWindow::MorningPeak,
        RhythmWindow::MiddayReset,
        RhythmWindow::EveningWindDown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RhythmWindow::MorningPeak => "morning_peak",
            RhythmWindow::MiddayReset => "midday_reset",
            RhythmWindow::EveningWindDown => "evening_wind_down",
        }
    }

    fn span(&self) -> (NaiveTime, NaiveTime) {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
        match self {
            RhythmWindow::MorningPeak => (t(7, 0), t(9, 30)),
            RhythmWindow::MiddayReset => (t(12, 0), t(13, 30)),
            RhythmWindow::EveningWindDown => (t(19, 0), t(21, 30)),
        }
    }

    pub fn contains(&self, at: NaiveTime) -> bool {
        let (start, end) = self.span();
        at >= start && at < end
    }
}

/// The dispatch window containing `at`, if any.
pub fn active_window(at: NaiveTime) -> Option<RhythmWindow> {
    RhythmWindow::ALL.into_iter().find(|w| w.contains(at))
}
