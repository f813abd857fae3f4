//! Elapsed-time counter for an active trip.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Monotonic trip timer with one-second display granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripTimer {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl TripTimer {
    /// Start counting from now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Wall-clock time the trip started, for the archive.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole seconds since the trip started.
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Elapsed time formatted for display.
    #[must_use]
    pub fn display(&self) -> String {
        format_elapsed(self.elapsed_secs())
    }

    /// An interval that fires every `period` after the start, for redrawing.
    #[must_use]
    pub fn ticks(&self, period: Duration) -> Interval {
        let mut ticks = interval_at(self.started + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticks
    }
}

/// Format seconds as `m:ss`; minutes are not wrapped into hours.
#[must_use]
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
