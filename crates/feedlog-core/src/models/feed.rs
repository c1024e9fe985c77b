use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::utils::{
    distant_past, format_sheet_date, format_sheet_time, parse_sheet_date, parse_sheet_datetime,
    ParseError,
};

/// One row of the feed log.
///
/// `volume` is signed: positive values are feeds, negative values record
/// milk that was prepared but wasted. `waste_amount` mirrors
/// `abs(volume)` on waste rows and is `0` otherwise; legacy 4-column rows
/// always read back as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub date: String,
    pub time: String,
    pub volume: i32,
    pub formula_type: String,
    #[serde(default)]
    pub waste_amount: u32,
    /// 1-based sheet row this entry was read from.
    #[serde(default)]
    pub row_position: Option<u32>,
}

impl FeedEntry {
    pub fn feed(date: NaiveDate, time: NaiveTime, volume: u32, formula_type: &str) -> Self {
        Self {
            date: format_sheet_date(date),
            time: format_sheet_time(time),
            volume: i32::try_from(volume).unwrap_or(i32::MAX),
            formula_type: formula_type.to_string(),
            waste_amount: 0,
            row_position: None,
        }
    }

    pub fn waste(date: NaiveDate, time: NaiveTime, amount: u32, formula_type: &str) -> Self {
        let amount = amount.min(i32::MAX as u32);
        Self {
            date: format_sheet_date(date),
            time: format_sheet_time(time),
            volume: -(amount as i32),
            formula_type: formula_type.to_string(),
            waste_amount: amount,
            row_position: None,
        }
    }

    pub fn with_row_position(mut self, row: u32) -> Self {
        self.row_position = Some(row);
        self
    }

    pub fn is_waste(&self) -> bool {
        self.volume < 0
    }

    pub fn actual_volume(&self) -> u32 {
        self.volume.unsigned_abs()
    }

    /// Signed volume, so waste nets against feeds when summed.
    pub fn effective_volume(&self) -> i32 {
        self.volume
    }

    /// Waste column value implied by `volume`.
    pub fn expected_waste_amount(&self) -> u32 {
        if self.is_waste() {
            self.actual_volume()
        } else {
            0
        }
    }

    pub fn try_full_date(&self) -> Result<NaiveDateTime, ParseError> {
        parse_sheet_datetime(&self.date, &self.time)
    }

    /// Timestamp of the entry, or the distant-past sentinel if the stored
    /// strings don't parse.
    pub fn full_date(&self) -> NaiveDateTime {
        self.try_full_date().unwrap_or_else(|_| distant_past())
    }

    pub fn calendar_date(&self) -> Option<NaiveDate> {
        parse_sheet_date(&self.date).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 29).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_feed_constructor() {
        let entry = FeedEntry::feed(day(), at(8, 0), 120, "Breast milk");
        assert_eq!(entry.date, "6/29/2025");
        assert_eq!(entry.time, "8:00 AM");
        assert_eq!(entry.volume, 120);
        assert_eq!(entry.waste_amount, 0);
        assert!(!entry.is_waste());
    }

    #[test]
    fn test_waste_constructor_keeps_invariant() {
        let entry = FeedEntry::waste(day(), at(9, 30), 30, "Breast milk");
        assert_eq!(entry.volume, -30);
        assert!(entry.is_waste());
        assert_eq!(entry.actual_volume(), 30);
        assert_eq!(entry.effective_volume(), -30);
        assert_eq!(entry.waste_amount, entry.actual_volume());
    }

    #[test]
    fn test_derived_fields_follow_sign() {
        for volume in [-250, -1, 0, 1, 250] {
            let entry = FeedEntry {
                date: "6/29/2025".to_string(),
                time: "8:00 AM".to_string(),
                volume,
                formula_type: "Similac 360".to_string(),
                waste_amount: 0,
                row_position: None,
            };
            assert_eq!(entry.is_waste(), volume < 0);
            assert_eq!(entry.actual_volume(), volume.unsigned_abs());
            assert_eq!(entry.effective_volume(), volume);
        }
    }

    #[test]
    fn test_full_date_parses() {
        let entry = FeedEntry::feed(day(), at(14, 30), 90, "Similac 360");
        assert_eq!(entry.full_date(), day().and_time(at(14, 30)));
    }

    #[test]
    fn test_full_date_falls_back_to_distant_past() {
        let mut entry = FeedEntry::feed(day(), at(14, 30), 90, "Similac 360");
        entry.time = "half past two".to_string();
        assert!(entry.try_full_date().is_err());
        assert_eq!(entry.full_date(), distant_past());
        // The calendar date alone still resolves
        assert_eq!(entry.calendar_date(), Some(day()));
    }
}
