//! Conversion between entries and raw sheet rows.
//!
//! Feed rows exist in two shapes in the same sheet: legacy 4-column rows
//! `[date, time, volume, formula]` and current 5-column rows that add a
//! waste amount. Both must decode. Writes always emit 5 columns.
//!
//! Decoding never fails loudly: a row that can't be understood (the
//! header row, a half-typed manual edit) is skipped so the rest of the
//! sheet still loads.

use tracing::debug;

use crate::models::{FeedEntry, PumpingEntry};

pub const FEED_COLUMNS: usize = 5;
pub const LEGACY_FEED_COLUMNS: usize = 4;
pub const PUMPING_COLUMNS: usize = 3;

pub const FEED_HEADER: [&str; FEED_COLUMNS] =
    ["Date", "Time", "Volume", "Formula Type", "Waste Amount"];
pub const PUMPING_HEADER: [&str; PUMPING_COLUMNS] = ["Date", "Time", "Volume"];

pub fn encode_feed_row(entry: &FeedEntry) -> Vec<String> {
    let waste_amount = entry.expected_waste_amount();
    if waste_amount != entry.waste_amount {
        debug!(
            volume = entry.volume,
            waste_amount = entry.waste_amount,
            "Correcting waste amount to match volume sign"
        );
    }
    vec![
        entry.date.clone(),
        entry.time.clone(),
        entry.volume.to_string(),
        entry.formula_type.clone(),
        waste_amount.to_string(),
    ]
}

pub fn decode_feed_row(row: &[String]) -> Option<FeedEntry> {
    if row.len() < LEGACY_FEED_COLUMNS {
        return None;
    }
    let volume = row[2].trim().parse::<i32>().ok()?;
    let waste_amount = row
        .get(4)
        .and_then(|cell| cell.trim().parse::<u32>().ok())
        .unwrap_or(0);

    Some(FeedEntry {
        date: row[0].clone(),
        time: row[1].clone(),
        volume,
        formula_type: row[3].clone(),
        waste_amount,
        row_position: None,
    })
}

pub fn encode_pumping_row(entry: &PumpingEntry) -> Vec<String> {
    vec![entry.date.clone(), entry.time.clone(), entry.volume.to_string()]
}

pub fn decode_pumping_row(row: &[String]) -> Option<PumpingEntry> {
    if row.len() < PUMPING_COLUMNS {
        return None;
    }
    let volume = row[2].trim().parse::<u32>().ok()?;
    Some(PumpingEntry {
        date: row[0].clone(),
        time: row[1].clone(),
        volume,
        row_position: None,
    })
}

/// Sheet row number of `values[index]` for a range starting at `first_row`.
fn row_number(first_row: u32, index: usize) -> u32 {
    first_row.saturating_add(u32::try_from(index).unwrap_or(u32::MAX))
}

/// Decode every feed row of a range whose first row is sheet row
/// `first_row`, tagging each entry with its row position.
pub fn decode_feed_rows(values: &[Vec<String>], first_row: u32) -> Vec<FeedEntry> {
    values
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let row_number = row_number(first_row, index);
            match decode_feed_row(row) {
                Some(entry) => Some(entry.with_row_position(row_number)),
                None => {
                    debug!(row = row_number, columns = row.len(), "Skipping undecodable feed row");
                    None
                }
            }
        })
        .collect()
}

pub fn decode_pumping_rows(values: &[Vec<String>], first_row: u32) -> Vec<PumpingEntry> {
    values
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let row_number = row_number(first_row, index);
            match decode_pumping_row(row) {
                Some(entry) => Some(entry.with_row_position(row_number)),
                None => {
                    debug!(
                        row = row_number,
                        columns = row.len(),
                        "Skipping undecodable pumping row"
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_encode_feed_row_always_five_columns() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 29).unwrap();
        let time = NaiveTime::from_hms_opt(14, 30, 0).unwrap();

        let feed = FeedEntry::feed(date, time, 120, "Breast milk");
        assert_eq!(
            encode_feed_row(&feed),
            row(&["6/29/2025", "2:30 PM", "120", "Breast milk", "0"])
        );

        let waste = FeedEntry::waste(date, time, 30, "Breast milk");
        assert_eq!(
            encode_feed_row(&waste),
            row(&["6/29/2025", "2:30 PM", "-30", "Breast milk", "30"])
        );
    }

    #[test]
    fn test_encode_feed_row_enforces_waste_invariant() {
        let mut entry = FeedEntry::feed(
            NaiveDate::from_ymd_opt(2025, 6, 29).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            120,
            "Similac 360",
        );
        entry.waste_amount = 45;
        assert_eq!(encode_feed_row(&entry)[4], "0");

        entry.volume = -45;
        entry.waste_amount = 0;
        assert_eq!(encode_feed_row(&entry)[4], "45");
    }

    #[test]
    fn test_decode_round_trip() {
        let entry = FeedEntry::waste(
            NaiveDate::from_ymd_opt(2025, 6, 29).unwrap(),
            NaiveTime::from_hms_opt(21, 5, 0).unwrap(),
            25,
            "Similac 360",
        );
        assert_eq!(decode_feed_row(&encode_feed_row(&entry)), Some(entry));
    }

    #[test]
    fn test_decode_legacy_row() {
        let entry = decode_feed_row(&row(&["6/29/2025", "9:30 AM", "-30", "Breast milk"])).unwrap();
        assert_eq!(entry.volume, -30);
        assert!(entry.is_waste());
        assert_eq!(entry.waste_amount, 0);
    }

    #[test]
    fn test_decode_tolerates_bad_waste_and_extra_columns() {
        let cells = row(&["6/29/2025", "9:30 AM", " 90 ", "Breast milk", "n/a", "note", "x"]);
        let entry = decode_feed_row(&cells).unwrap();
        assert_eq!(entry.volume, 90);
        assert_eq!(entry.waste_amount, 0);
    }

    #[test]
    fn test_decode_rejects_short_or_non_numeric_rows() {
        assert_eq!(decode_feed_row(&row(&["6/29/2025", "9:30 AM", "90"])), None);
        assert_eq!(decode_feed_row(&row(&FEED_HEADER)), None);
        assert_eq!(decode_feed_row(&row(&["6/29/2025", "9:30 AM", "12.5", "Breast milk"])), None);
        assert_eq!(decode_feed_row(&[]), None);
    }

    #[test]
    fn test_decode_feed_rows_assigns_positions_and_skips_bad_rows() {
        let values = vec![
            row(&FEED_HEADER),
            row(&["6/29/2025", "8:00 AM", "120", "Breast milk"]),
            row(&["garbage"]),
            row(&["6/29/2025", "9:30 AM", "-30", "Breast milk", "30"]),
        ];
        let entries = decode_feed_rows(&values, 1);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].row_position, Some(2));
        assert_eq!(entries[1].row_position, Some(4));
        assert_eq!(entries[1].waste_amount, 30);
    }

    #[test]
    fn test_mixed_feed_and_waste_totals() {
        let values = vec![
            row(&["6/29/2025", "8:00 AM", "120", "Breast milk"]),
            row(&["6/29/2025", "9:30 AM", "-30", "Breast milk", "30"]),
            row(&["6/29/2025", "12:00 PM", "150", "Similac 360", "0"]),
        ];
        let entries = decode_feed_rows(&values, 1);

        let net: i32 = entries.iter().map(FeedEntry::effective_volume).sum();
        let fed: u32 = entries
            .iter()
            .filter(|e| !e.is_waste())
            .map(FeedEntry::actual_volume)
            .sum();
        let wasted: u32 = entries
            .iter()
            .filter(|e| e.is_waste())
            .map(FeedEntry::actual_volume)
            .sum();

        assert_eq!(net, 240);
        assert_eq!(fed, 270);
        assert_eq!(wasted, 30);
    }

    #[test]
    fn test_pumping_rows() {
        let entry = PumpingEntry::new(
            NaiveDate::from_ymd_opt(2025, 6, 29).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            110,
        );
        let encoded = encode_pumping_row(&entry);
        assert_eq!(encoded, row(&["6/29/2025", "6:00 AM", "110"]));
        assert_eq!(decode_pumping_row(&encoded), Some(entry));

        assert_eq!(decode_pumping_row(&row(&["6/29/2025", "6:00 AM", "-5"])), None);
        assert_eq!(decode_pumping_row(&row(&["6/29/2025", "6:00 AM"])), None);

        let entries = decode_pumping_rows(&[row(&PUMPING_HEADER), encoded], 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].row_position, Some(2));
    }
}
