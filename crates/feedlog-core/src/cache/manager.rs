use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::clock::Clock;

/// Cached entries are served for 5 minutes after they are stored.
pub const DEFAULT_MAX_AGE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>) -> Self {
        Self { data, cached_at }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) > max_age
    }
}

/// Memory-only key/value cache with passive expiry.
///
/// Stale entries stay in the map until overwritten or cleared but are
/// never returned. All methods take `&self`; the map sits behind a mutex
/// held only for the duration of each call.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CachedData<V>>>,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_max_age(clock, Duration::seconds(DEFAULT_MAX_AGE_SECS))
    }

    pub fn with_max_age(clock: Arc<dyn Clock>, max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
            clock,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedData<V>>> {
        // A panic while holding the lock can't leave the map half-written
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn store(&self, key: &str, value: V) {
        let now = self.clock.now();
        self.entries()
            .insert(key.to_string(), CachedData::new(value, now));
        debug!(key, "Cache store");
    }

    /// Fresh value for `key`, or `None` if absent or older than max age.
    pub fn retrieve(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries();
        match entries.get(key) {
            Some(cached) if !cached.is_stale(now, self.max_age) => {
                debug!(key, "Cache hit");
                Some(cached.data.clone())
            }
            Some(_) => {
                debug!(key, "Cache entry expired");
                None
            }
            None => {
                debug!(key, "Cache miss");
                None
            }
        }
    }

    /// Age of the entry under `key`, fresh or not.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries().get(key).map(|cached| cached.age(now))
    }

    pub fn clear(&self, key: &str) {
        if self.entries().remove(key).is_some() {
            debug!(key, "Cache cleared");
        }
    }

    pub fn clear_all(&self) {
        self.entries().clear();
    }
}
