//! Observation and label window selection
//!
//! Both windows are derived once per run from the reference instant and shared
//! by every later stage, so all users are labeled against the same boundaries.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;

/// Window boundaries for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub observation_start: DateTime<Utc>,
    pub observation_end: DateTime<Utc>,
    pub label_end: DateTime<Utc>,
}

impl WindowBounds {
    /// Windows around `now`: observation `[now - W, now]`, label `(now, now + W]`.
    ///
    /// Bounds saturate at the representable time range instead of overflowing.
    pub fn around(now: DateTime<Utc>, config: &PipelineConfig) -> Self {
        let span = Duration::days(i64::from(config.window_days));
        Self {
            observation_start: now
                .checked_sub_signed(span)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            observation_end: now,
            label_end: now
                .checked_add_signed(span)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Observation membership, inclusive on both ends
    pub fn in_observation(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.observation_start && ts <= self.observation_end
    }

    /// Label membership: after the observation end, up to and including the label end
    pub fn in_label(&self, ts: DateTime<Utc>) -> bool {
        ts > self.observation_end && ts <= self.label_end
    }

    /// Calendar date the streak walk starts from
    pub fn end_date(&self) -> NaiveDate {
        self.observation_end.date_naive()
    }

    /// Number of UTC calendar dates the observation window touches
    pub fn observation_dates(&self) -> u32 {
        let days = (self.observation_end.date_naive() - self.observation_start.date_naive())
            .num_days();
        u32::try_from(days + 1).unwrap_or(u32::MAX)
    }
}
