//! Sheet date/time string formats.
//!
//! Dates are written `M/d/yyyy` (`6/29/2025`) and times `h:mm a`
//! (`2:30 PM`). The strings round-trip through the sheet unchanged, so
//! formatting must stay bit-exact; parsing is lenient about padding and
//! whitespace.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

const DATE_WRITE_FORMAT: &str = "%-m/%-d/%Y";
const DATE_READ_FORMAT: &str = "%m/%d/%Y";
const TIME_WRITE_FORMAT: &str = "%-I:%M %p";
const TIME_READ_FORMAT: &str = "%I:%M %p";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid date: {0:?}")]
    InvalidDate(String),

    #[error("Invalid time: {0:?}")]
    InvalidTime(String),
}

/// Placeholder timestamp for entries whose date or time can't be parsed.
/// Sorts before every real entry.
pub fn distant_past() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
}

pub fn format_sheet_date(date: NaiveDate) -> String {
    date.format(DATE_WRITE_FORMAT).to_string()
}

pub fn format_sheet_time(time: NaiveTime) -> String {
    time.format(TIME_WRITE_FORMAT).to_string()
}

/// Short day label, e.g. `6/29`.
pub fn format_short_date(date: NaiveDate) -> String {
    date.format("%-m/%-d").to_string()
}

pub fn parse_sheet_date(s: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(s.trim(), DATE_READ_FORMAT)
        .map_err(|_| ParseError::InvalidDate(s.to_string()))
}

pub fn parse_sheet_time(s: &str) -> Result<NaiveTime, ParseError> {
    // Some platforms emit a narrow no-break space before AM/PM
    let normalized: String = s
        .trim()
        .chars()
        .map(|c| if c == '\u{202f}' || c == '\u{a0}' { ' ' } else { c })
        .collect();
    NaiveTime::parse_from_str(&normalized, TIME_READ_FORMAT)
        .map_err(|_| ParseError::InvalidTime(s.to_string()))
}

pub fn parse_sheet_datetime(date: &str, time: &str) -> Result<NaiveDateTime, ParseError> {
    Ok(parse_sheet_date(date)?.and_time(parse_sheet_time(time)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sheet_date_unpadded() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        assert_eq!(format_sheet_date(date), "6/9/2025");
        let date = NaiveDate::from_ymd_opt(2025, 12, 29).unwrap();
        assert_eq!(format_sheet_date(date), "12/29/2025");
    }

    #[test]
    fn test_format_sheet_time_twelve_hour() {
        assert_eq!(format_sheet_time(NaiveTime::from_hms_opt(14, 30, 0).unwrap()), "2:30 PM");
        assert_eq!(format_sheet_time(NaiveTime::from_hms_opt(0, 5, 0).unwrap()), "12:05 AM");
        assert_eq!(format_sheet_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()), "12:00 PM");
    }

    #[test]
    fn test_parse_sheet_date() {
        assert_eq!(
            parse_sheet_date("6/29/2025"),
            Ok(NaiveDate::from_ymd_opt(2025, 6, 29).unwrap())
        );
        assert_eq!(
            parse_sheet_date("06/09/2025"),
            Ok(NaiveDate::from_ymd_opt(2025, 6, 9).unwrap())
        );
        assert!(parse_sheet_date("Date").is_err());
        assert!(parse_sheet_date("2025-06-29").is_err());
    }

    #[test]
    fn test_parse_sheet_time_variants() {
        let expected = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
        assert_eq!(parse_sheet_time("2:30 PM"), Ok(expected));
        assert_eq!(parse_sheet_time("02:30 pm"), Ok(expected));
        assert_eq!(parse_sheet_time("2:30\u{202f}PM"), Ok(expected));
        assert!(parse_sheet_time("14:30").is_err());
    }

    #[test]
    fn test_distant_past_sorts_first() {
        let real = parse_sheet_datetime("1/1/1970", "12:00 AM").unwrap();
        assert!(distant_past() < real);
    }
}
