//! Utility functions for sheet date/time strings.

pub mod format;

pub use format::{
    distant_past, format_sheet_date, format_sheet_time, format_short_date, parse_sheet_date,
    parse_sheet_datetime, parse_sheet_time, ParseError,
};
