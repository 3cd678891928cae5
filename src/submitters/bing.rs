//! IndexNow (Bing) submitter.
//!
//! All pending URLs go out in a single IndexNow request. The batch is
//! all-or-nothing: on 200 or 202 every URL in it is stamped and the store is
//! saved once; on anything else nothing changes and the whole batch is sent
//! again next run.

use super::{http_client, BatchSubmitter};
use crate::config::Config;
use crate::models::{ApiResponse, Engine, SubmissionMark};
use crate::store::StateStore;
use crate::utils::{require_file, truncate_for_log};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tracing::{error, info, instrument};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexNowPayload<'a> {
    host: &'a str,
    key: &'a str,
    key_location: &'a str,
    url_list: &'a [String],
}

/// Client for an IndexNow endpoint, bound to one site and key.
#[derive(Debug, Clone)]
pub struct IndexNowClient {
    http: reqwest::Client,
    endpoint: String,
    host: String,
    key: String,
    key_location: String,
}

impl IndexNowClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        host: impl Into<String>,
        key: impl Into<String>,
        key_location: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            host: host.into(),
            key: key.into(),
            key_location: key_location.into(),
        }
    }

    /// Build a client from the `bing` section of the configuration.
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn Error>> {
        let (key, key_location) = config.indexnow_credentials()?;
        Ok(Self::new(
            http_client()?,
            config.bing.endpoint.clone(),
            config.site_host(),
            key,
            key_location,
        ))
    }
}

impl BatchSubmitter for IndexNowClient {
    async fn submit(&self, urls: &[String]) -> Result<ApiResponse, Box<dyn Error>> {
        let payload = IndexNowPayload {
            host: &self.host,
            key: &self.key,
            key_location: &self.key_location,
            url_list: urls,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(serde_json::to_vec(&payload)?)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

/// `true` for the statuses IndexNow uses to accept a batch.
pub fn is_accepted(status: u16) -> bool {
    matches!(status, 200 | 202)
}

/// Outcome of one IndexNow run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BingRunSummary {
    /// URLs sent in the batch (zero when nothing was pending).
    pub attempted: usize,
    /// Response status, if a request completed.
    pub status: Option<u16>,
    /// URLs stamped as submitted.
    pub marked: usize,
}

/// Submit every pending record in one batch and stamp them all on success.
///
/// # Arguments
///
/// * `store` - Loaded state; every pending record gets a Bing timestamp on 200/202
/// * `path` - State file, saved once when the batch was accepted
/// * `submitter` - Sends the batch
///
/// # Returns
///
/// A [`BingRunSummary`]. Any other status, or a transport error, leaves every
/// record pending and the file untouched; the error is logged, not returned.
///
/// # Examples
///
/// ```ignore
/// let client = IndexNowClient::from_config(config)?;
/// let summary = submit_pending(&mut store, &config.csv_file, &client).await?;
/// assert_eq!(summary.marked, summary.attempted);
/// ```
#[instrument(level = "info", skip_all)]
pub async fn submit_pending<B: BatchSubmitter>(
    store: &mut StateStore,
    path: &Path,
    submitter: &B,
) -> Result<BingRunSummary, Box<dyn Error>> {
    let pending = store.pending(Engine::Bing);
    if pending.is_empty() {
        info!("No new URLs to submit to Bing");
        return Ok(BingRunSummary::default());
    }

    let urls: Vec<String> = pending
        .iter()
        .filter_map(|&i| store.record(i).map(|r| r.url.clone()))
        .collect();
    let mut summary = BingRunSummary {
        attempted: urls.len(),
        ..Default::default()
    };

    info!(count = urls.len(), "Submitting URLs to IndexNow");
    let response = match submitter.submit(&urls).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "IndexNow request failed; batch stays pending");
            return Ok(summary);
        }
    };
    summary.status = Some(response.status);

    if !is_accepted(response.status) {
        error!(
            status = response.status,
            body = %truncate_for_log(&response.body, 300),
            "IndexNow rejected the batch; it stays pending"
        );
        return Ok(summary);
    }

    let mark = SubmissionMark::now();
    for &position in &pending {
        store.mark(position, Engine::Bing, mark.clone());
    }
    summary.marked = pending.len();
    store.save(path).await?;
    info!(status = response.status, marked = summary.marked, "State file updated with IndexNow submission times");
    Ok(summary)
}

/// Run the IndexNow submitter against the configured store.
#[instrument(level = "info", skip_all)]
pub async fn run(config: &Config) -> Result<BingRunSummary, Box<dyn Error>> {
    require_file("State file", &config.csv_file).await?;
    let client = IndexNowClient::from_config(config)?;
    let mut store = StateStore::load(&config.csv_file).await?;
    submit_pending(&mut store, &config.csv_file, &client).await
}

/// Send an explicit list of URLs to IndexNow without touching the store.
#[instrument(level = "info", skip_all, fields(count = urls.len()))]
pub async fn submit_urls(config: &Config, urls: &[String]) -> Result<ApiResponse, Box<dyn Error>> {
    let client = IndexNowClient::from_config(config)?;
    client.submit(urls).await
}
