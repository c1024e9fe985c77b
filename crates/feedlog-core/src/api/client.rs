//! Google Sheets v4 implementation of [`TabularTransport`].
//!
//! Writes use `valueInputOption=RAW` so date and time strings are stored
//! exactly as written and read back unchanged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::{debug, warn};

use super::transport::{row_range, TabularTransport, ValueRange};
use crate::auth::Credential;
use crate::error::{Result, StoreError};

// ============================================================================
// Constants
// ============================================================================

const API_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// HTTP request timeout in seconds.
/// Every remote call gets an explicit deadline instead of waiting forever.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct CreatedSpreadsheet {
    #[serde(rename = "spreadsheetId")]
    spreadsheet_id: String,
}

/// Sheets API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SheetsClient {
    client: Client,
    base_url: String,
    initial_backoff: Duration,
    /// Numeric sheet ids by (spreadsheet id, sheet title); needed for row deletes.
    sheet_ids: Arc<Mutex<HashMap<(String, String), i64>>>,
}

impl SheetsClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            sheet_ids: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Use a different API root, e.g. a local mock server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_rate_limit_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| StoreError::ConfigurationInvalid(format!("Bad API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                StoreError::ConfigurationInvalid("API base URL cannot have a path".to_string())
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Check if response is successful, returning a typed error if not.
    /// Returns Ok(None) for rate limiting so the caller can retry.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>> {
        let status = response.status();
        if status.is_success() {
            Ok(Some(response))
        } else if status.as_u16() == 429 {
            Ok(None)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::from_status(status.as_u16(), &body))
        }
    }

    async fn send(&self, build: impl Fn() -> RequestBuilder, url: &Url) -> Result<Response> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = build().send().await?;
            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(StoreError::HttpError(429));
                    }
                    warn!(
                        url = %url,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        credential: &Credential,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        debug!(%method, url = %url, "Sheets request");
        let response = self
            .send(
                || {
                    let builder = self
                        .client
                        .request(method.clone(), url.clone())
                        .bearer_auth(&credential.access_token);
                    match body {
                        Some(body) => builder.json(body),
                        None => builder,
                    }
                },
                &url,
            )
            .await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            StoreError::DataFormatError(format!("Unexpected response from {}: {}", url.path(), e))
        })
    }

    async fn sheet_id(&self, credential: &Credential, store_id: &str, sheet: &str) -> Result<i64> {
        let key = (store_id.to_string(), sheet.to_string());
        if let Some(id) = self.cached_sheet_id(&key) {
            return Ok(id);
        }

        let url = self.url(&[store_id], &[("fields", "sheets.properties(sheetId,title)")])?;
        let metadata: SpreadsheetMetadata = self.request(Method::GET, url, credential, None).await?;

        let mut ids = self.sheet_ids.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in metadata.sheets {
            ids.insert(
                (store_id.to_string(), entry.properties.title),
                entry.properties.sheet_id,
            );
        }
        ids.get(&key)
            .copied()
            .ok_or_else(|| StoreError::DataFormatError(format!("Sheet {:?} not found", sheet)))
    }

    fn cached_sheet_id(&self, key: &(String, String)) -> Option<i64> {
        self.sheet_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

#[async_trait]
impl TabularTransport for SheetsClient {
    async fn read_range(
        &self,
        credential: &Credential,
        store_id: &str,
        range: &str,
    ) -> Result<ValueRange> {
        let url = self.url(
            &[store_id, "values", range],
            &[("majorDimension", "ROWS"), ("valueRenderOption", "FORMATTED_VALUE")],
        )?;
        let values: ValueRange = self.request(Method::GET, url, credential, None).await?;
        debug!(range = %values.range, rows = values.values.len(), "Read range");
        Ok(values)
    }

    async fn append_row(
        &self,
        credential: &Credential,
        store_id: &str,
        range: &str,
        row: &[String],
    ) -> Result<()> {
        let target = format!("{}:append", range);
        let url = self.url(
            &[store_id, "values", &target],
            &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
        )?;
        let body = json!({ "majorDimension": "ROWS", "values": [row] });
        let _: serde_json::Value = self.request(Method::POST, url, credential, Some(&body)).await?;
        Ok(())
    }

    async fn update_row(
        &self,
        credential: &Credential,
        store_id: &str,
        sheet: &str,
        row_number: u32,
        row: &[String],
    ) -> Result<()> {
        let range = row_range(sheet, row_number, row.len());
        let url = self.url(&[store_id, "values", &range], &[("valueInputOption", "RAW")])?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": [row] });
        let _: serde_json::Value = self.request(Method::PUT, url, credential, Some(&body)).await?;
        Ok(())
    }

    async fn delete_row(
        &self,
        credential: &Credential,
        store_id: &str,
        sheet: &str,
        row_number: u32,
    ) -> Result<()> {
        if row_number == 0 {
            return Err(StoreError::DataFormatError("Row numbers start at 1".to_string()));
        }
        let sheet_id = self.sheet_id(credential, store_id, sheet).await?;
        let target = format!("{}:batchUpdate", store_id);
        let url = self.url(&[&target], &[])?;
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row_number - 1,
                        "endIndex": row_number,
                    }
                }
            }]
        });
        let _: serde_json::Value = self.request(Method::POST, url, credential, Some(&body)).await?;
        Ok(())
    }

    async fn create_store(
        &self,
        credential: &Credential,
        title: &str,
        sheets: &[&str],
    ) -> Result<String> {
        let url = self.url(&[], &[])?;
        let sheets: Vec<_> = sheets
            .iter()
            .map(|sheet| json!({ "properties": { "title": sheet } }))
            .collect();
        let body = json!({ "properties": { "title": title }, "sheets": sheets });
        let created: CreatedSpreadsheet = self
            .request(Method::POST, url, credential, Some(&body))
            .await?;
        Ok(created.spreadsheet_id)
    }
}
