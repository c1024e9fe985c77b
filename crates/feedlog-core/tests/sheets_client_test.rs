//! Integration tests for the Sheets transport against a mock server.
//!
//! Covers:
//! - Range reads with mixed cell types
//! - RAW appends, row updates and row deletes (sheet id lookup is memoized)
//! - Error mapping (structured bodies, 401, bare 5xx)
//! - 429 backoff
//! - StorageClient end to end over HTTP

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedlog_core::auth::Credential;
use feedlog_core::storage::StorageService;
use feedlog_core::testing::ScriptedSignIn;
use feedlog_core::{
    SheetsClient, SimClock, StorageClient, StoreError, TabularTransport, TokenManager,
};

const STORE: &str = "sheet-123";

fn credential() -> Credential {
    Credential::new("ya29.test", Utc::now() + ChronoDuration::hours(1))
}

fn client(server: &MockServer) -> SheetsClient {
    SheetsClient::new()
        .expect("client build")
        .with_base_url(&format!("{}/v4/spreadsheets", server.uri()))
        .with_rate_limit_backoff(Duration::from_millis(10))
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn read_range_returns_rows_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123/values/Feeds!A:E"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(query_param("majorDimension", "ROWS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Feeds!A1:E3",
            "majorDimension": "ROWS",
            "values": [
                ["Date", "Time", "Volume", "Formula Type", "Waste Amount"],
                ["6/29/2025", "8:00 AM", 120, "Breast milk"],
                ["6/29/2025", "9:30 AM", "-30", "Breast milk", "30"]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let values = client(&server)
        .read_range(&credential(), STORE, "Feeds!A:E")
        .await
        .expect("read should succeed");

    assert_eq!(values.first_row(), 1);
    assert_eq!(values.values.len(), 3);
    assert_eq!(values.values[1], row(&["6/29/2025", "8:00 AM", "120", "Breast milk"]));
}

#[tokio::test]
async fn read_range_of_empty_sheet_has_no_values() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123/values/Pumping!A:C"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Pumping!A1:C1000",
            "majorDimension": "ROWS"
        })))
        .mount(&server)
        .await;

    let values = client(&server)
        .read_range(&credential(), STORE, "Pumping!A:C")
        .await
        .unwrap();
    assert!(values.values.is_empty());
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn append_row_uses_raw_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-123/values/Feeds!A:E:append"))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(body_partial_json(json!({
            "values": [["6/29/2025", "2:00 PM", "90", "Similac 360", "0"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": STORE,
            "updates": { "updatedRows": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .append_row(
            &credential(),
            STORE,
            "Feeds!A:E",
            &row(&["6/29/2025", "2:00 PM", "90", "Similac 360", "0"]),
        )
        .await
        .expect("append should succeed");
}

#[tokio::test]
async fn update_row_targets_single_row_range() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v4/spreadsheets/sheet-123/values/Feeds!A7:E7"))
        .and(query_param("valueInputOption", "RAW"))
        .and(body_partial_json(json!({
            "range": "Feeds!A7:E7",
            "values": [["6/29/2025", "8:00 AM", "130", "Breast milk", "0"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedRows": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .update_row(
            &credential(),
            STORE,
            "Feeds",
            7,
            &row(&["6/29/2025", "8:00 AM", "130", "Breast milk", "0"]),
        )
        .await
        .expect("update should succeed");
}

#[tokio::test]
async fn delete_row_resolves_sheet_id_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sheets": [
                { "properties": { "sheetId": 0, "title": "Feeds" } },
                { "properties": { "sheetId": 987, "title": "Pumping" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-123:batchUpdate"))
        .and(body_partial_json(json!({
            "requests": [{
                "deleteDimension": {
                    "range": { "sheetId": 987, "dimension": "ROWS", "startIndex": 4, "endIndex": 5 }
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "replies": [{}] })))
        .expect(2)
        .mount(&server)
        .await;

    let sheets = client(&server);
    sheets.delete_row(&credential(), STORE, "Pumping", 5).await.unwrap();
    sheets.delete_row(&credential(), STORE, "Pumping", 5).await.unwrap();
}

#[tokio::test]
async fn delete_row_in_unknown_sheet_is_a_data_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sheets": [] })))
        .mount(&server)
        .await;

    let err = client(&server)
        .delete_row(&credential(), STORE, "Feeds", 2)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DataFormatError(_)));
}

#[tokio::test]
async fn create_store_returns_new_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets"))
        .and(body_partial_json(json!({
            "properties": { "title": "Baby Log" },
            "sheets": [
                { "properties": { "title": "Feeds" } },
                { "properties": { "title": "Pumping" } }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": "new-sheet-456",
            "properties": { "title": "Baby Log" }
        })))
        .mount(&server)
        .await;

    let id = client(&server)
        .create_store(&credential(), "Baby Log", &["Feeds", "Pumping"])
        .await
        .unwrap();
    assert_eq!(id, "new-sheet-456");
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn structured_error_body_maps_to_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": "Requested entity was not found.",
                "status": "NOT_FOUND"
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .read_range(&credential(), STORE, "Feeds!A:E")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::ProviderSpecific("Requested entity was not found. (NOT_FOUND)".to_string())
    );
}

#[tokio::test]
async fn unauthorized_maps_to_http_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "code": 401,
                "message": "Request had invalid authentication credentials.",
                "status": "UNAUTHENTICATED"
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .read_range(&credential(), STORE, "Feeds!A:E")
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::HttpError(401));
    assert!(err.is_auth_rejection());
}

#[tokio::test]
async fn bare_server_error_maps_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = client(&server)
        .read_range(&credential(), STORE, "Feeds!A:E")
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::HttpError(503));
}

#[tokio::test]
async fn malformed_success_body_is_a_data_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captive portal</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .read_range(&credential(), STORE, "Feeds!A:E")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DataFormatError(_)));
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn rate_limited_request_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Feeds!A1:E1",
            "values": [["6/29/2025", "8:00 AM", "120", "Breast milk", "0"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let values = client(&server)
        .read_range(&credential(), STORE, "Feeds!A:E")
        .await
        .expect("should succeed after backoff");
    assert_eq!(values.values.len(), 1);
}

#[tokio::test]
async fn rate_limit_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let err = client(&server)
        .read_range(&credential(), STORE, "Feeds!A:E")
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::HttpError(429));
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn storage_client_reads_mixed_schema_sheet_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123/values/Feeds!A:E"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Feeds!A1:E4",
            "values": [
                ["Date", "Time", "Volume", "Formula Type", "Waste Amount"],
                ["6/29/2025", "8:00 AM", "120", "Breast milk"],
                ["6/29/2025", "9:30 AM", "-30", "Breast milk", "30"],
                ["6/29/2025", "12:00 PM", "150", "Similac 360", "0"]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let clock = SimClock::at(Utc.with_ymd_and_hms(2025, 6, 29, 15, 0, 0).unwrap());
    let provider = Arc::new(ScriptedSignIn::new(Arc::new(clock.clone()), "parent@example.com"));
    let auth = Arc::new(TokenManager::new(provider, Arc::new(clock.clone())));
    let storage =
        StorageClient::new(client(&server), auth, Arc::new(clock), Some(STORE.to_string()));
    storage.sign_in().await.unwrap();

    assert_eq!(storage.fetch_today_feed_total(false).await.unwrap(), 240);
    let feeds = storage.fetch_today_feeds(false).await.unwrap();
    assert_eq!(feeds.len(), 3);
    assert_eq!(feeds.iter().filter(|e| e.is_waste()).count(), 1);
}
