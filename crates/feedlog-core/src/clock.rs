//! Injectable time source.
//!
//! Cache expiry, token refresh thresholds, backoff sleeps and "today"
//! all read time through [`Clock`] so tests can drive them with
//! [`SimClock`] instead of waiting on the wall clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current local calendar date.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }

    /// Sleep for `duration`. Dropping the returned future cancels the sleep.
    async fn sleep(&self, duration: StdDuration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: StdDuration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated clock for deterministic tests.
///
/// Time only moves forward. `sleep` advances the clock by the requested
/// duration and returns immediately, so backoff schedules can be asserted
/// on exactly. Calendar dates are taken in UTC so results don't depend on
/// the host timezone.
#[derive(Debug, Clone)]
pub struct SimClock {
    current_ms: Arc<AtomicI64>,
    slept_ms: Arc<AtomicI64>,
}

impl SimClock {
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            current_ms: Arc::new(AtomicI64::new(start.timestamp_millis())),
            slept_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        debug_assert!(by >= Duration::zero(), "cannot go back in time");
        self.current_ms
            .fetch_add(by.num_milliseconds().max(0), Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    /// Total time spent in `sleep` since creation.
    pub fn total_slept(&self) -> Duration {
        Duration::milliseconds(self.slept_ms.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Clock for SimClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.current_ms.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    async fn sleep(&self, duration: StdDuration) {
        let ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.slept_ms.fetch_add(ms, Ordering::SeqCst);
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}
