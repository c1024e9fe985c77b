//! Remote tabular store access.
//!
//! This module provides the `TabularTransport` seam the storage client
//! talks through, and `SheetsClient`, its Google Sheets v4 implementation.
//! Requests carry the OAuth bearer token supplied by the auth layer.

pub mod client;
pub mod transport;

pub use client::SheetsClient;
pub use transport::{column_letter, row_range, TabularTransport, ValueRange};
