use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::utils::format_short_date;

/// Aggregate volume for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct DailyTotal {
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub date: NaiveDate,
    pub volume: i32,
}

impl DailyTotal {
    pub fn new(date: NaiveDate, volume: i32) -> Self {
        Self { date, volume }
    }

    /// Weekday abbreviation, e.g. "Sun"
    pub fn day_name(&self) -> String {
        self.date.format("%a").to_string()
    }

    pub fn short_date(&self) -> String {
        format_short_date(self.date)
    }

    pub fn is_today(&self, today: NaiveDate) -> bool {
        self.date == today
    }

    pub fn is_yesterday(&self, today: NaiveDate) -> bool {
        self.date == today - Duration::days(1)
    }

    /// Fraction of `goal` reached, clamped to `0.0..=1.0`. A non-positive
    /// goal counts as met.
    pub fn goal_progress(&self, goal: i32) -> f64 {
        if goal <= 0 {
            return 1.0;
        }
        (f64::from(self.volume) / f64::from(goal)).clamp(0.0, 1.0)
    }
}
