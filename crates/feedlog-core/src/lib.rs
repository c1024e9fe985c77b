//! feedlog-core - storage layer for an infant feeding and pumping log.
//!
//! Entries live in a Google Sheets spreadsheet. This crate provides the
//! typed models, the row codec that reads both legacy 4-column and current
//! 5-column feed rows, a 5-minute in-memory cache, OAuth token refresh
//! with retry, and `StorageClient`, the facade a UI talks to.

pub mod aggregation;
pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api::{SheetsClient, TabularTransport};
pub use auth::{AuthState, GoogleOAuthProvider, SignInProvider, TokenManager};
pub use clock::{Clock, SimClock, SystemClock};
pub use config::Settings;
pub use error::{Result, StoreError};
pub use models::{DailyTotal, FeedEntry, PumpingEntry};
pub use storage::{StorageClient, StorageService};
