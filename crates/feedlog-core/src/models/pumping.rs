use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::utils::{
    distant_past, format_sheet_date, format_sheet_time, parse_sheet_date, parse_sheet_datetime,
    ParseError,
};

/// One pumping session. Volume is never negative; there is no waste
/// concept for pumping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PumpingEntry {
    pub date: String,
    pub time: String,
    pub volume: u32,
    #[serde(default)]
    pub row_position: Option<u32>,
}

impl PumpingEntry {
    pub fn new(date: NaiveDate, time: NaiveTime, volume: u32) -> Self {
        Self {
            date: format_sheet_date(date),
            time: format_sheet_time(time),
            volume,
            row_position: None,
        }
    }

    pub fn with_row_position(mut self, row: u32) -> Self {
        self.row_position = Some(row);
        self
    }

    pub fn try_full_date(&self) -> Result<NaiveDateTime, ParseError> {
        parse_sheet_datetime(&self.date, &self.time)
    }

    pub fn full_date(&self) -> NaiveDateTime {
        self.try_full_date().unwrap_or_else(|_| distant_past())
    }

    pub fn calendar_date(&self) -> Option<NaiveDate> {
        parse_sheet_date(&self.date).ok()
    }
}
