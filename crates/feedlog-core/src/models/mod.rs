//! Data models for feed log entities.
//!
//! - `FeedEntry`: a feed or waste record with signed volume
//! - `PumpingEntry`: a pumping session
//! - `DailyTotal`: one day's aggregate volume, with display helpers

pub mod daily_total;
pub mod feed;
pub mod pumping;

pub use daily_total::DailyTotal;
pub use feed::FeedEntry;
pub use pumping::PumpingEntry;
