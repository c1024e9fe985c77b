//! Storage facade used by the presentation layer.
//!
//! `StorageService` is the whole surface a UI needs: sign-in, feed and
//! pumping operations, and store configuration. `StorageClient` is the
//! implementation; it owns the cache and routes every remote call
//! through one authenticated-request path.

pub mod client;

pub use client::{CacheKey, StorageClient, FEED_RANGE, FEED_SHEET, PUMPING_RANGE, PUMPING_SHEET};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::auth::AuthState;
use crate::error::Result;
use crate::models::{DailyTotal, FeedEntry, PumpingEntry};

#[async_trait]
pub trait StorageService: Send + Sync {
    /// True while a session exists, including while its token is refreshing.
    fn is_signed_in(&self) -> bool;
    /// Email of the signed-in account.
    fn user_email(&self) -> Option<String>;
    /// Current position in the sign-in state machine.
    fn auth_state(&self) -> AuthState;

    /// Interactive sign-in. Returns the signed-in email and drops everything cached.
    async fn sign_in(&self) -> Result<String>;
    /// Silent sign-in at launch. Returns whether a session was restored.
    async fn restore_previous_sign_in(&self) -> Result<bool>;
    /// End the session and drop everything cached.
    async fn sign_out(&self) -> Result<()>;
    /// Refresh the token if it expires within ten minutes.
    async fn handle_foreground(&self) -> Result<()>;

    /// The configured spreadsheet id, if any.
    fn store_id(&self) -> Option<String>;
    /// Point at a different spreadsheet. Drops everything cached.
    fn set_store_id(&self, store_id: Option<String>);
    /// Create a new spreadsheet with the Feeds and Pumping sheets and
    /// switch to it.
    async fn create_store(&self, title: &str) -> Result<String>;

    async fn append_feed(&self, entry: &FeedEntry) -> Result<()>;
    /// Net volume fed today (feeds minus waste).
    async fn fetch_today_feed_total(&self, force_refresh: bool) -> Result<i32>;
    /// Today's feed and waste entries, newest first.
    async fn fetch_today_feeds(&self, force_refresh: bool) -> Result<Vec<FeedEntry>>;
    /// One total per day for the last 7 days including today, oldest first.
    async fn fetch_past_7_days_feed_totals(&self, force_refresh: bool) -> Result<Vec<DailyTotal>>;
    async fn update_feed_entry(&self, entry: &FeedEntry) -> Result<()>;
    async fn delete_feed_entry(&self, entry: &FeedEntry) -> Result<()>;
    /// Entries on an arbitrary day, newest first. Never cached.
    async fn fetch_feeds_on(&self, date: NaiveDate) -> Result<Vec<FeedEntry>>;
    /// Most frequent formula type over the last 7 days.
    async fn most_common_formula_type(&self, force_refresh: bool) -> Result<Option<String>>;

    async fn append_pumping(&self, entry: &PumpingEntry) -> Result<()>;
    async fn fetch_today_pumping_total(&self, force_refresh: bool) -> Result<i32>;
    async fn fetch_today_pumping(&self, force_refresh: bool) -> Result<Vec<PumpingEntry>>;
    async fn fetch_past_7_days_pumping_totals(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<DailyTotal>>;
    async fn update_pumping_entry(&self, entry: &PumpingEntry) -> Result<()>;
    async fn delete_pumping_entry(&self, entry: &PumpingEntry) -> Result<()>;

    /// Force-refresh every dashboard dataset concurrently.
    async fn refresh_all(&self) -> Result<()>;
}
