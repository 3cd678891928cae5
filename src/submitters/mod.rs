//! Submitters that push pending URLs to search-engine indexing APIs.
//!
//! Each submitter follows the same pattern:
//!
//! 1. **Select**: take the records the engine has never accepted, in store order
//! 2. **Submit**: call the engine's API
//! 3. **Record**: stamp accepted records and persist the store
//!
//! # Supported Engines
//!
//! | Engine | Module | Granularity | Success |
//! |--------|--------|-------------|---------|
//! | Google Indexing API | [`google`] | One URL per request, capped per run | 200 |
//! | IndexNow (Bing) | [`bing`] | All pending URLs in one request | 200 or 202 |
//!
//! The HTTP calls sit behind [`UrlNotifier`] and [`BatchSubmitter`] so the
//! run loops can be driven by any implementation.

pub mod bing;
pub mod google;

use crate::models::{ApiResponse, NotificationKind};
use std::error::Error;

/// Sends a single-URL notification to an indexing API.
pub trait UrlNotifier {
    /// Notify the API about `url`. Non-2xx statuses are returned as
    /// responses; only transport and authentication problems are errors.
    async fn notify(&self, url: &str, kind: NotificationKind)
        -> Result<ApiResponse, Box<dyn Error>>;
}

/// Sends a list of URLs to an indexing API in one request.
pub trait BatchSubmitter {
    async fn submit(&self, urls: &[String]) -> Result<ApiResponse, Box<dyn Error>>;
}

/// Build the shared HTTP client.
pub fn http_client() -> Result<reqwest::Client, Box<dyn Error>> {
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
