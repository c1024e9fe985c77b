//! Pure summaries over entry lists.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::{DailyTotal, FeedEntry, PumpingEntry};

/// Something with a calendar day and a volume that adds into daily totals.
pub trait Measured {
    fn calendar_date(&self) -> Option<NaiveDate>;
    fn signed_volume(&self) -> i32;
    fn timestamp(&self) -> NaiveDateTime;
}

impl Measured for FeedEntry {
    fn calendar_date(&self) -> Option<NaiveDate> {
        FeedEntry::calendar_date(self)
    }

    fn signed_volume(&self) -> i32 {
        self.effective_volume()
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.full_date()
    }
}

impl Measured for PumpingEntry {
    fn calendar_date(&self) -> Option<NaiveDate> {
        PumpingEntry::calendar_date(self)
    }

    fn signed_volume(&self) -> i32 {
        i32::try_from(self.volume).unwrap_or(i32::MAX)
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.full_date()
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// The `days` days ending on (and including) `end`.
    pub fn ending_on(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: end - Duration::days(span),
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

/// One total per day of `window`, oldest first. Days without entries
/// are present with volume 0. Entries with unparseable dates are ignored.
pub fn daily_totals<E: Measured>(entries: &[E], window: DateWindow) -> Vec<DailyTotal> {
    let mut sums: HashMap<NaiveDate, i32> = HashMap::new();
    for entry in entries {
        if let Some(date) = entry.calendar_date().filter(|d| window.contains(*d)) {
            let sum = sums.entry(date).or_insert(0);
            *sum = sum.saturating_add(entry.signed_volume());
        }
    }

    window
        .days()
        .map(|date| DailyTotal::new(date, sums.get(&date).copied().unwrap_or(0)))
        .collect()
}

/// Entries whose calendar date is `date`.
pub fn entries_on<E: Measured + Clone>(entries: &[E], date: NaiveDate) -> Vec<E> {
    entries
        .iter()
        .filter(|e| e.calendar_date() == Some(date))
        .cloned()
        .collect()
}

/// Net volume: feeds minus waste.
pub fn total_volume<E: Measured>(entries: &[E]) -> i32 {
    entries
        .iter()
        .fold(0i32, |sum, e| sum.saturating_add(e.signed_volume()))
}

/// Volume actually fed, ignoring waste rows.
pub fn feed_volume(entries: &[FeedEntry]) -> u32 {
    entries
        .iter()
        .filter(|e| !e.is_waste())
        .map(FeedEntry::actual_volume)
        .sum()
}

pub fn waste_volume(entries: &[FeedEntry]) -> u32 {
    entries
        .iter()
        .filter(|e| e.is_waste())
        .map(FeedEntry::actual_volume)
        .sum()
}

/// Most recent entry by date and time.
pub fn latest_entry<E: Measured>(entries: &[E]) -> Option<&E> {
    entries.iter().max_by_key(|e| e.timestamp())
}

/// Most frequent formula type among non-waste entries. On a tie the type
/// that appears first in `entries` wins.
pub fn most_common_formula_type(entries: &[FeedEntry]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, entry) in entries.iter().filter(|e| !e.is_waste()).enumerate() {
        let name = entry.formula_type.trim();
        if name.is_empty() {
            continue;
        }
        counts.entry(name).or_insert((0, index)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(name, _)| name.to_string())
}
