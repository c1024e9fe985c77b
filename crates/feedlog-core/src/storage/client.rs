use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use super::StorageService;
use crate::aggregation::{self, DateWindow};
use crate::api::TabularTransport;
use crate::auth::{AuthState, Credential, TokenManager};
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::codec::{self, FEED_HEADER, PUMPING_HEADER};
use crate::config::Settings;
use crate::error::{Result, StoreError};
use crate::models::{DailyTotal, FeedEntry, PumpingEntry};

pub const FEED_SHEET: &str = "Feeds";
pub const PUMPING_SHEET: &str = "Pumping";
pub const FEED_RANGE: &str = "Feeds!A:E";
pub const PUMPING_RANGE: &str = "Pumping!A:C";

/// Days covered by the weekly totals, today included.
const WEEK_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    TodayFeedTotal,
    TodayFeeds,
    Past7DaysFeedTotals,
    Past7DaysFeeds,
    TodayPumpingTotal,
    TodayPumping,
    Past7DaysPumpingTotals,
    Past7DaysPumping,
}

impl CacheKey {
    const COUNT: usize = 8;

    const FEED_KEYS: [CacheKey; 4] = [
        CacheKey::TodayFeedTotal,
        CacheKey::TodayFeeds,
        CacheKey::Past7DaysFeedTotals,
        CacheKey::Past7DaysFeeds,
    ];

    const PUMPING_KEYS: [CacheKey; 4] = [
        CacheKey::TodayPumpingTotal,
        CacheKey::TodayPumping,
        CacheKey::Past7DaysPumpingTotals,
        CacheKey::Past7DaysPumping,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheKey::TodayFeedTotal => "todayFeedTotal",
            CacheKey::TodayFeeds => "todayFeeds",
            CacheKey::Past7DaysFeedTotals => "past7DaysFeedTotals",
            CacheKey::Past7DaysFeeds => "past7DaysFeeds",
            CacheKey::TodayPumpingTotal => "todayPumpingTotal",
            CacheKey::TodayPumping => "todayPumping",
            CacheKey::Past7DaysPumpingTotals => "past7DaysPumpingTotals",
            CacheKey::Past7DaysPumping => "past7DaysPumping",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dataset {
    Feeds,
    Pumping,
}

impl Dataset {
    fn keys(self) -> &'static [CacheKey] {
        match self {
            Dataset::Feeds => &CacheKey::FEED_KEYS,
            Dataset::Pumping => &CacheKey::PUMPING_KEYS,
        }
    }
}

#[derive(Debug, Clone)]
enum CachedValue {
    Volume(i32),
    Feeds(Vec<FeedEntry>),
    Pumping(Vec<PumpingEntry>),
    Totals(Vec<DailyTotal>),
}

trait Cacheable: Clone + Sized {
    fn into_cached(self) -> CachedValue;
    fn from_cached(value: CachedValue) -> Option<Self>;
}

impl Cacheable for i32 {
    fn into_cached(self) -> CachedValue {
        CachedValue::Volume(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Volume(v) => Some(v),
            _ => None,
        }
    }
}

impl Cacheable for Vec<FeedEntry> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Feeds(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Feeds(v) => Some(v),
            _ => None,
        }
    }
}

impl Cacheable for Vec<PumpingEntry> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Pumping(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Pumping(v) => Some(v),
            _ => None,
        }
    }
}

impl Cacheable for Vec<DailyTotal> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Totals(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Totals(v) => Some(v),
            _ => None,
        }
    }
}

/// Per-key fetch coordination.
#[derive(Default)]
struct KeySlot {
    lock: tokio::sync::Mutex<()>,
    /// Completed fetches stored under this key.
    fills: AtomicU64,
    /// Invalidations of this key; a fetch that overlaps one is not cached.
    invalidations: AtomicU64,
}

/// `StorageService` over any `TabularTransport`.
///
/// Reads are served from a 5-minute cache unless forced. Concurrent
/// fetches of the same key share one remote read. Successful writes
/// invalidate every cached view of the dataset they touched.
pub struct StorageClient<T> {
    transport: T,
    auth: Arc<TokenManager>,
    clock: Arc<dyn Clock>,
    cache: TtlCache<CachedValue>,
    slots: [KeySlot; CacheKey::COUNT],
    store_id: RwLock<Option<String>>,
}

impl<T: TabularTransport> StorageClient<T> {
    pub fn new(
        transport: T,
        auth: Arc<TokenManager>,
        clock: Arc<dyn Clock>,
        store_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            auth,
            cache: TtlCache::new(clock.clone()),
            clock,
            slots: std::array::from_fn(|_| KeySlot::default()),
            store_id: RwLock::new(normalize_store_id(store_id)),
        }
    }

    pub fn from_settings(
        transport: T,
        auth: Arc<TokenManager>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        Self::new(transport, auth, clock, settings.store_id().map(str::to_string))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn auth(&self) -> &TokenManager {
        &self.auth
    }

    /// How long ago `key` was last fetched, if it is in the cache.
    pub fn cache_age(&self, key: CacheKey) -> Option<Duration> {
        self.cache.age(key.as_str())
    }

    fn require_store_id(&self) -> Result<String> {
        self.store_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                StoreError::ConfigurationInvalid("No spreadsheet configured".to_string())
            })
    }

    /// Run `call` with a valid credential. Any failure triggers one forced
    /// token refresh and exactly one retry.
    async fn authenticated<R, F, Fut>(&self, operation: &'static str, call: F) -> Result<R>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let credential = self.auth.valid_credential().await?;
        let first = match call(credential).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        warn!(operation, error = %first, "Remote call failed, refreshing token and retrying once");
        let credential = match self.auth.force_refresh().await {
            Ok(credential) => credential,
            Err(refresh_error) => {
                if !self.auth.is_signed_in() {
                    self.invalidate_all();
                }
                // Keep the original error unless the credential itself was rejected
                return Err(if first.is_auth_rejection() { refresh_error } else { first });
            }
        };
        call(credential).await.inspect_err(|e| {
            warn!(operation, error = %e, "Retry after token refresh failed");
        })
    }

    /// `authenticated` against the configured store.
    async fn with_store<R, F, Fut>(&self, operation: &'static str, call: F) -> Result<R>
    where
        F: Fn(Credential, String) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if !self.auth.is_signed_in() {
            return Err(StoreError::NotSignedIn);
        }
        let store_id = self.require_store_id()?;
        self.authenticated(operation, |credential| call(credential, store_id.clone()))
            .await
    }

    /// Serve `key` from the cache, or fetch and cache it.
    async fn cached<V, F, Fut>(&self, key: CacheKey, force_refresh: bool, fetch: F) -> Result<V>
    where
        V: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        // Cached rows belong to the session that fetched them
        if !self.auth.is_signed_in() {
            return Err(StoreError::NotSignedIn);
        }
        if !force_refresh {
            if let Some(value) = self.cache.retrieve(key.as_str()).and_then(V::from_cached) {
                return Ok(value);
            }
        }

        let slot = &self.slots[key.index()];
        let fills_seen = slot.fills.load(Ordering::SeqCst);
        let _guard = slot.lock.lock().await;

        // Another fetch of this key may have finished while we waited
        let filled_meanwhile = slot.fills.load(Ordering::SeqCst) != fills_seen;
        if !force_refresh || filled_meanwhile {
            if let Some(value) = self.cache.retrieve(key.as_str()).and_then(V::from_cached) {
                debug!(key = key.as_str(), "Joined in-flight fetch");
                return Ok(value);
            }
        }

        let invalidations_seen = slot.invalidations.load(Ordering::SeqCst);
        let value = fetch().await?;
        if slot.invalidations.load(Ordering::SeqCst) == invalidations_seen {
            self.cache.store(key.as_str(), value.clone().into_cached());
            slot.fills.fetch_add(1, Ordering::SeqCst);
        } else {
            debug!(key = key.as_str(), "Dataset changed during fetch, result not cached");
        }
        Ok(value)
    }

    fn invalidate_all(&self) {
        self.invalidate(Dataset::Feeds);
        self.invalidate(Dataset::Pumping);
    }

    fn invalidate(&self, dataset: Dataset) {
        for key in dataset.keys() {
            self.slots[key.index()]
                .invalidations
                .fetch_add(1, Ordering::SeqCst);
            self.cache.clear(key.as_str());
        }
    }

    fn week(&self) -> DateWindow {
        DateWindow::ending_on(self.clock.today(), WEEK_DAYS)
    }

    async fn read_feeds(&self) -> Result<Vec<FeedEntry>> {
        let range = self
            .with_store("read_feeds", |credential, store_id| async move {
                self.transport.read_range(&credential, &store_id, FEED_RANGE).await
            })
            .await?;
        let entries = codec::decode_feed_rows(&range.values, range.first_row());
        debug!(rows = range.values.len(), entries = entries.len(), "Read feed sheet");
        Ok(entries)
    }

    async fn read_pumping(&self) -> Result<Vec<PumpingEntry>> {
        let range = self
            .with_store("read_pumping", |credential, store_id| async move {
                self.transport.read_range(&credential, &store_id, PUMPING_RANGE).await
            })
            .await?;
        let entries = codec::decode_pumping_rows(&range.values, range.first_row());
        debug!(rows = range.values.len(), entries = entries.len(), "Read pumping sheet");
        Ok(entries)
    }

    async fn today_feeds(&self, force_refresh: bool) -> Result<Vec<FeedEntry>> {
        self.cached(CacheKey::TodayFeeds, force_refresh, || async {
            let today = self.clock.today();
            let mut entries = aggregation::entries_on(&self.read_feeds().await?, today);
            newest_first(&mut entries, FeedEntry::full_date);
            Ok(entries)
        })
        .await
    }

    async fn week_feeds(&self, force_refresh: bool) -> Result<Vec<FeedEntry>> {
        self.cached(CacheKey::Past7DaysFeeds, force_refresh, || async {
            let week = self.week();
            let mut entries = self.read_feeds().await?;
            entries.retain(|e| e.calendar_date().is_some_and(|d| week.contains(d)));
            Ok(entries)
        })
        .await
    }

    async fn today_pumping(&self, force_refresh: bool) -> Result<Vec<PumpingEntry>> {
        self.cached(CacheKey::TodayPumping, force_refresh, || async {
            let today = self.clock.today();
            let mut entries = aggregation::entries_on(&self.read_pumping().await?, today);
            newest_first(&mut entries, PumpingEntry::full_date);
            Ok(entries)
        })
        .await
    }

    async fn week_pumping(&self, force_refresh: bool) -> Result<Vec<PumpingEntry>> {
        self.cached(CacheKey::Past7DaysPumping, force_refresh, || async {
            let week = self.week();
            let mut entries = self.read_pumping().await?;
            entries.retain(|e| e.calendar_date().is_some_and(|d| week.contains(d)));
            Ok(entries)
        })
        .await
    }

    async fn write_row(
        &self,
        operation: &'static str,
        range: &str,
        row: Vec<String>,
    ) -> Result<()> {
        let row = row.as_slice();
        self.with_store(operation, |credential, store_id| async move {
            self.transport.append_row(&credential, &store_id, range, row).await
        })
        .await
    }

    async fn rewrite_row(
        &self,
        operation: &'static str,
        sheet: &str,
        row_number: u32,
        row: Vec<String>,
    ) -> Result<()> {
        let row = row.as_slice();
        self.with_store(operation, |credential, store_id| async move {
            self.transport
                .update_row(&credential, &store_id, sheet, row_number, row)
                .await
        })
        .await
    }

    async fn remove_row(
        &self,
        operation: &'static str,
        sheet: &str,
        row_number: u32,
    ) -> Result<()> {
        self.with_store(operation, |credential, store_id| async move {
            self.transport
                .delete_row(&credential, &store_id, sheet, row_number)
                .await
        })
        .await
    }
}

fn normalize_store_id(store_id: Option<String>) -> Option<String> {
    store_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

fn newest_first<E>(entries: &mut [E], timestamp: impl Fn(&E) -> chrono::NaiveDateTime) {
    entries.sort_by_key(|e| std::cmp::Reverse(timestamp(e)));
}

fn require_row(row_position: Option<u32>, kind: &str) -> Result<u32> {
    row_position
        .filter(|row| *row > 0)
        .ok_or_else(|| StoreError::DataFormatError(format!("{} entry has no row position", kind)))
}

#[async_trait]
impl<T: TabularTransport> StorageService for StorageClient<T> {
    fn is_signed_in(&self) -> bool {
        self.auth.is_signed_in()
    }

    fn user_email(&self) -> Option<String> {
        self.auth.user_email()
    }

    fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    async fn sign_in(&self) -> Result<String> {
        let email = self.auth.sign_in().await?;
        self.invalidate_all();
        Ok(email)
    }

    async fn restore_previous_sign_in(&self) -> Result<bool> {
        let restored = self.auth.restore_previous_sign_in().await?;
        self.invalidate_all();
        Ok(restored)
    }

    async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        self.invalidate_all();
        Ok(())
    }

    async fn handle_foreground(&self) -> Result<()> {
        let result = self.auth.handle_foreground().await;
        if !self.auth.is_signed_in() {
            self.invalidate_all();
        }
        result
    }

    fn store_id(&self) -> Option<String> {
        self.store_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_store_id(&self, store_id: Option<String>) {
        let store_id = normalize_store_id(store_id);
        info!(store_id = ?store_id, "Switching spreadsheet");
        *self.store_id.write().unwrap_or_else(PoisonError::into_inner) = store_id;
        self.invalidate(Dataset::Feeds);
        self.invalidate(Dataset::Pumping);
    }

    async fn create_store(&self, title: &str) -> Result<String> {
        let store_id = self
            .authenticated("create_store", |credential| async move {
                self.transport
                    .create_store(&credential, title, &[FEED_SHEET, PUMPING_SHEET])
                    .await
            })
            .await?;

        let headers: [(&str, Vec<String>); 2] = [
            (FEED_SHEET, FEED_HEADER.iter().map(|h| h.to_string()).collect()),
            (PUMPING_SHEET, PUMPING_HEADER.iter().map(|h| h.to_string()).collect()),
        ];
        for (sheet, header) in &headers {
            let (store_id, header) = (store_id.as_str(), header.as_slice());
            self.authenticated("write_header", |credential| async move {
                self.transport
                    .update_row(&credential, store_id, sheet, 1, header)
                    .await
            })
            .await?;
        }

        info!(store_id = %store_id, title, "Created spreadsheet");
        self.set_store_id(Some(store_id.clone()));
        Ok(store_id)
    }

    async fn append_feed(&self, entry: &FeedEntry) -> Result<()> {
        self.write_row("append_feed", FEED_RANGE, codec::encode_feed_row(entry))
            .await?;
        info!(volume = entry.volume, formula = %entry.formula_type, "Feed appended");
        self.invalidate(Dataset::Feeds);
        Ok(())
    }

    async fn fetch_today_feed_total(&self, force_refresh: bool) -> Result<i32> {
        self.cached(CacheKey::TodayFeedTotal, force_refresh, || async {
            let feeds = self.today_feeds(force_refresh).await?;
            Ok(aggregation::total_volume(&feeds))
        })
        .await
    }

    async fn fetch_today_feeds(&self, force_refresh: bool) -> Result<Vec<FeedEntry>> {
        self.today_feeds(force_refresh).await
    }

    async fn fetch_past_7_days_feed_totals(&self, force_refresh: bool) -> Result<Vec<DailyTotal>> {
        self.cached(CacheKey::Past7DaysFeedTotals, force_refresh, || async {
            let feeds = self.week_feeds(force_refresh).await?;
            Ok(aggregation::daily_totals(&feeds, self.week()))
        })
        .await
    }

    async fn update_feed_entry(&self, entry: &FeedEntry) -> Result<()> {
        let row = require_row(entry.row_position, "Feed")?;
        self.rewrite_row("update_feed", FEED_SHEET, row, codec::encode_feed_row(entry))
            .await?;
        info!(row, volume = entry.volume, "Feed updated");
        self.invalidate(Dataset::Feeds);
        Ok(())
    }

    async fn delete_feed_entry(&self, entry: &FeedEntry) -> Result<()> {
        let row = require_row(entry.row_position, "Feed")?;
        self.remove_row("delete_feed", FEED_SHEET, row).await?;
        info!(row, "Feed deleted");
        self.invalidate(Dataset::Feeds);
        Ok(())
    }

    async fn fetch_feeds_on(&self, date: NaiveDate) -> Result<Vec<FeedEntry>> {
        let mut entries = aggregation::entries_on(&self.read_feeds().await?, date);
        newest_first(&mut entries, FeedEntry::full_date);
        Ok(entries)
    }

    async fn most_common_formula_type(&self, force_refresh: bool) -> Result<Option<String>> {
        let mut feeds = self.week_feeds(force_refresh).await?;
        newest_first(&mut feeds, FeedEntry::full_date);
        Ok(aggregation::most_common_formula_type(&feeds))
    }

    async fn append_pumping(&self, entry: &PumpingEntry) -> Result<()> {
        self.write_row("append_pumping", PUMPING_RANGE, codec::encode_pumping_row(entry))
            .await?;
        info!(volume = entry.volume, "Pumping appended");
        self.invalidate(Dataset::Pumping);
        Ok(())
    }

    async fn fetch_today_pumping_total(&self, force_refresh: bool) -> Result<i32> {
        self.cached(CacheKey::TodayPumpingTotal, force_refresh, || async {
            let sessions = self.today_pumping(force_refresh).await?;
            Ok(aggregation::total_volume(&sessions))
        })
        .await
    }

    async fn fetch_today_pumping(&self, force_refresh: bool) -> Result<Vec<PumpingEntry>> {
        self.today_pumping(force_refresh).await
    }

    async fn fetch_past_7_days_pumping_totals(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<DailyTotal>> {
        self.cached(CacheKey::Past7DaysPumpingTotals, force_refresh, || async {
            let sessions = self.week_pumping(force_refresh).await?;
            Ok(aggregation::daily_totals(&sessions, self.week()))
        })
        .await
    }

    async fn update_pumping_entry(&self, entry: &PumpingEntry) -> Result<()> {
        let row = require_row(entry.row_position, "Pumping")?;
        self.rewrite_row("update_pumping", PUMPING_SHEET, row, codec::encode_pumping_row(entry))
            .await?;
        info!(row, volume = entry.volume, "Pumping updated");
        self.invalidate(Dataset::Pumping);
        Ok(())
    }

    async fn delete_pumping_entry(&self, entry: &PumpingEntry) -> Result<()> {
        let row = require_row(entry.row_position, "Pumping")?;
        self.remove_row("delete_pumping", PUMPING_SHEET, row).await?;
        info!(row, "Pumping deleted");
        self.invalidate(Dataset::Pumping);
        Ok(())
    }

    async fn refresh_all(&self) -> Result<()> {
        futures::try_join!(
            self.fetch_today_feed_total(true),
            self.fetch_past_7_days_feed_totals(true),
            self.fetch_today_pumping_total(true),
            self.fetch_past_7_days_pumping_totals(true),
        )?;
        debug!("Refreshed all datasets");
        Ok(())
    }
}
