use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::auth::Credential;
use crate::error::Result;

/// Rectangular block of cells returned by a range read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValueRange {
    /// Resolved A1 range, e.g. `Feeds!A1:E42`.
    #[serde(default)]
    pub range: String,
    #[serde(default, deserialize_with = "deserialize_cells")]
    pub values: Vec<Vec<String>>,
}

impl ValueRange {
    pub fn new(range: &str, values: Vec<Vec<String>>) -> Self {
        Self {
            range: range.to_string(),
            values,
        }
    }

    /// 1-based sheet row of `values[0]`. Open-ended ranges like `A:E`
    /// start at row 1.
    pub fn first_row(&self) -> u32 {
        let cells = self.range.rsplit('!').next().unwrap_or_default();
        let first_cell = cells.split(':').next().unwrap_or_default();
        first_cell
            .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '$')
            .parse()
            .unwrap_or(1)
    }
}

/// Cells arrive as strings in formatted mode, but numbers and booleans
/// show up when a sheet is edited by hand; keep their text form.
fn deserialize_cells<'de, D>(deserializer: D) -> std::result::Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Vec<Vec<serde_json::Value>> = Deserialize::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect())
}

/// Column letter for a 1-based column index (1 → A, 27 → AA).
pub fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A1 range covering `width` columns of one row.
pub fn row_range(sheet: &str, row_number: u32, width: usize) -> String {
    format!("{}!A{}:{}{}", sheet, row_number, column_letter(width.max(1)), row_number)
}

/// Remote tabular store addressed by spreadsheet id, sheet title and
/// 1-based row number.
#[async_trait]
pub trait TabularTransport: Send + Sync {
    async fn read_range(
        &self,
        credential: &Credential,
        store_id: &str,
        range: &str,
    ) -> Result<ValueRange>;

    async fn append_row(
        &self,
        credential: &Credential,
        store_id: &str,
        range: &str,
        row: &[String],
    ) -> Result<()>;

    async fn update_row(
        &self,
        credential: &Credential,
        store_id: &str,
        sheet: &str,
        row_number: u32,
        row: &[String],
    ) -> Result<()>;

    async fn delete_row(
        &self,
        credential: &Credential,
        store_id: &str,
        sheet: &str,
        row_number: u32,
    ) -> Result<()>;

    /// Create a new store with the given sheets and return its id.
    async fn create_store(
        &self,
        credential: &Credential,
        title: &str,
        sheets: &[&str],
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_row() {
        assert_eq!(ValueRange::new("Feeds!A1:E42", vec![]).first_row(), 1);
        assert_eq!(ValueRange::new("Feeds!A7:E42", vec![]).first_row(), 7);
        assert_eq!(ValueRange::new("'Feed Log'!$A$3:$E$9", vec![]).first_row(), 3);
        assert_eq!(ValueRange::new("Feeds!A:E", vec![]).first_row(), 1);
        assert_eq!(ValueRange::default().first_row(), 1);
    }

    #[test]
    fn test_deserialize_mixed_cells() {
        let json = r#"{
            "range": "Feeds!A1:E2",
            "majorDimension": "ROWS",
            "values": [
                ["Date", "Time", "Volume"],
                ["6/29/2025", "8:00 AM", 120, "Breast milk", null]
            ]
        }"#;
        let range: ValueRange = serde_json::from_str(json).unwrap();
        assert_eq!(range.values[1], vec!["6/29/2025", "8:00 AM", "120", "Breast milk", ""]);
    }

    #[test]
    fn test_deserialize_empty_sheet() {
        let range: ValueRange = serde_json::from_str(r#"{"range":"Pumping!A1:C1000"}"#).unwrap();
        assert!(range.values.is_empty());
    }

    #[test]
    fn test_column_letter_and_row_range() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(5), "E");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(row_range("Feeds", 12, 5), "Feeds!A12:E12");
        assert_eq!(row_range("Pumping", 3, 3), "Pumping!A3:C3");
    }
}
