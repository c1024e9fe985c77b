//! In-memory caching of fetched datasets.
//!
//! This module provides `TtlCache`, a per-process key/value store whose
//! entries are served for 5 minutes by default. Nothing is persisted;
//! a restart always refetches from the sheet.

pub mod manager;

pub use manager::{CachedData, TtlCache, DEFAULT_MAX_AGE_SECS};
