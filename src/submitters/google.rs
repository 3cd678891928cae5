//! Google Indexing API submitter.
//!
//! Pending URLs are sent one at a time with a fixed pause between requests.
//! The store is saved after every accepted URL, so an interrupted run loses at
//! most the request in flight.
//!
//! # Response Handling
//!
//! | Status | Effect |
//! |--------|--------|
//! | 200 | Record stamped, store saved |
//! | 429 | Run stops; the rest stay pending |
//! | other / transport error | Logged, record stays pending, next URL |
//!
//! A run also stops once `submission_limit` URLs have been accepted.

use super::{http_client, UrlNotifier};
use crate::auth::{ServiceAccountAuth, ServiceAccountKey};
use crate::config::Config;
use crate::models::{ApiResponse, Engine, NotificationKind, SubmissionMark};
use crate::store::StateStore;
use crate::utils::{require_file, truncate_for_log};
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Source of bearer tokens for the Indexing API.
pub trait TokenSource {
    async fn access_token(&self) -> Result<String, Box<dyn Error>>;
}

impl TokenSource for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, Box<dyn Error>> {
        ServiceAccountAuth::access_token(self).await
    }
}

#[derive(Debug, Serialize)]
struct UrlNotification<'a> {
    url: &'a str,
    #[serde(rename = "type")]
    kind: NotificationKind,
}

/// Authenticated client for the `urlNotifications:publish` endpoint.
#[derive(Debug)]
pub struct GoogleIndexingClient<T> {
    http: reqwest::Client,
    tokens: T,
    api_url: String,
}

impl<T: TokenSource> GoogleIndexingClient<T> {
    pub fn new(http: reqwest::Client, tokens: T, api_url: impl Into<String>) -> Self {
        Self {
            http,
            tokens,
            api_url: api_url.into(),
        }
    }
}

impl<T: TokenSource> UrlNotifier for GoogleIndexingClient<T> {
    async fn notify(
        &self,
        url: &str,
        kind: NotificationKind,
    ) -> Result<ApiResponse, Box<dyn Error>> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(token)
            .json(&UrlNotification { url, kind })
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

/// Outcome of one Google run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GoogleRunSummary {
    pub submitted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rate_limited: bool,
    pub cap_reached: bool,
}

/// Extract `error.message` from an Indexing API error body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Submit every pending record in store order, stopping on 429 or at `limit`.
///
/// # Arguments
///
/// * `store` - Loaded state; accepted records get a Google timestamp
/// * `path` - State file, saved after each accepted URL and once more at the end
/// * `notifier` - Sends one notification per URL
/// * `kind` - `URL_UPDATED` or `URL_DELETED`, used for every URL in the run
/// * `limit` - Maximum number of notifications attempted in this run
/// * `delay` - Pause after each attempt that does not end the run
///
/// # Returns
///
/// A [`GoogleRunSummary`] with counts of accepted, failed and skipped URLs and
/// whether the run stopped on rate limiting. Failed URLs stay pending.
///
/// # Examples
///
/// ```ignore
/// let client = GoogleIndexingClient::new(http, auth, &config.google.api_url);
/// let summary = submit_pending(
///     &mut store,
///     &config.csv_file,
///     &client,
///     NotificationKind::UrlUpdated,
///     200,
///     Duration::from_secs(1),
/// )
/// .await?;
/// ```
#[instrument(level = "info", skip(store, path, notifier))]
pub async fn submit_pending<N: UrlNotifier>(
    store: &mut StateStore,
    path: &Path,
    notifier: &N,
    kind: NotificationKind,
    limit: usize,
    delay: Duration,
) -> Result<GoogleRunSummary, Box<dyn Error>> {
    let mut summary = GoogleRunSummary::default();
    let pending = store.pending(Engine::Google);
    info!(pending = pending.len(), "Starting Google submission run");

    for position in pending {
        if summary.submitted >= limit {
            summary.cap_reached = true;
            break;
        }
        let Some(url) = store.record(position).map(|r| r.url.trim().to_string()) else {
            continue;
        };
        if !url.starts_with("http") {
            warn!(%url, "Skipping invalid entry");
            summary.skipped += 1;
            continue;
        }

        info!(n = summary.submitted + 1, limit, %url, "Submitting URL");
        match notifier.notify(&url, kind).await {
            Ok(ApiResponse { status: 200, .. }) => {
                store.mark(position, Engine::Google, SubmissionMark::now());
                summary.submitted += 1;
                store.save(path).await?;
                info!(%url, "Success (200): submission recorded");
                if summary.submitted >= limit {
                    summary.cap_reached = true;
                    break;
                }
            }
            Ok(ApiResponse { status: 429, body }) => {
                error!(%url, status = 429, message = %error_message(&body), "Rate limit exceeded; stopping for this run");
                summary.rate_limited = true;
                break;
            }
            Ok(ApiResponse { status, body }) => {
                error!(
                    %url,
                    status,
                    message = %error_message(&body),
                    body = %truncate_for_log(&body, 300),
                    "Submission failed"
                );
                summary.failed += 1;
            }
            Err(e) => {
                error!(%url, error = %e, "Error during submission");
                summary.failed += 1;
            }
        }

        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    if summary.cap_reached {
        info!(limit, "Submission limit reached; remaining URLs roll over to the next run");
    }
    store.save(path).await?;
    info!(
        submitted = summary.submitted,
        failed = summary.failed,
        skipped = summary.skipped,
        rate_limited = summary.rate_limited,
        "Google submission run complete"
    );
    Ok(summary)
}

/// Run the Google submitter against the configured store.
///
/// The service-account key and the state file must both exist; otherwise the
/// run fails before anything is read or written.
#[instrument(level = "info", skip(config))]
pub async fn run(config: &Config, kind: NotificationKind) -> Result<GoogleRunSummary, Box<dyn Error>> {
    require_file("Service account file", &config.service_account_file).await?;
    require_file("State file", &config.csv_file).await?;

    let http = http_client()?;
    let key = ServiceAccountKey::from_file(&config.service_account_file).await?;
    let auth = ServiceAccountAuth::new(key, http.clone()).map_err(|e| {
        error!(error = %e, "Authentication setup failed");
        e
    })?;
    let client = GoogleIndexingClient::new(http, auth, config.google.api_url.clone());

    let mut store = StateStore::load(&config.csv_file).await?;
    submit_pending(
        &mut store,
        &config.csv_file,
        &client,
        kind,
        config.google.submission_limit,
        config.google.request_delay(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UrlRecord;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers with a status chosen by call number (1-based).
    struct ScriptedNotifier {
        calls: Mutex<Vec<String>>,
        status_for: fn(usize) -> Option<u16>,
    }

    impl ScriptedNotifier {
        fn new(status_for: fn(usize) -> Option<u16>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                status_for,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl UrlNotifier for ScriptedNotifier {
        async fn notify(
            &self,
            url: &str,
            _kind: NotificationKind,
        ) -> Result<ApiResponse, Box<dyn Error>> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(url.to_string());
                calls.len()
            };
            match (self.status_for)(n) {
                Some(status) => Ok(ApiResponse {
                    status,
                    body: r#"{"error":{"message":"scripted"}}"#.to_string(),
                }),
                None => Err("connection reset".into()),
            }
        }
    }

    struct StaticToken;

    impl TokenSource for StaticToken {
        async fn access_token(&self) -> Result<String, Box<dyn Error>> {
            Ok("test-token".to_string())
        }
    }

    fn store_with(n: usize) -> StateStore {
        let mut store = StateStore::new();
        for i in 0..n {
            store.push(UrlRecord::new(format!("https://example.com/post-{i}/")));
        }
        store
    }

    #[tokio::test]
    async fn test_cap_limits_a_single_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        let mut store = store_with(250);
        let notifier = ScriptedNotifier::new(|_| Some(200));

        let summary = submit_pending(
            &mut store,
            &path,
            &notifier,
            NotificationKind::UrlUpdated,
            200,
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(summary.submitted, 200);
        assert!(summary.cap_reached);
        assert_eq!(notifier.calls().len(), 200);
        let reloaded = StateStore::load(&path).await.unwrap();
        assert_eq!(reloaded.pending(Engine::Google).len(), 50);
        assert_eq!(reloaded.pending(Engine::Google)[0], 200);
    }

    #[tokio::test]
    async fn test_rate_limit_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        let mut store = store_with(10);
        let notifier = ScriptedNotifier::new(|n| Some(if n == 5 { 429 } else { 200 }));

        let summary = submit_pending(
            &mut store,
            &path,
            &notifier,
            NotificationKind::UrlUpdated,
            200,
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert!(summary.rate_limited);
        assert_eq!(summary.submitted, 4);
        assert_eq!(notifier.calls().len(), 5);
        let reloaded = StateStore::load(&path).await.unwrap();
        assert_eq!(reloaded.pending(Engine::Google), vec![4, 5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_failures_leave_records_pending_and_continue() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        let mut store = store_with(4);
        let notifier = ScriptedNotifier::new(|n| match n {
            2 => Some(403),
            3 => None,
            _ => Some(200),
        });

        let summary = submit_pending(
            &mut store,
            &path,
            &notifier,
            NotificationKind::UrlDeleted,
            200,
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.failed, 2);
        assert!(!summary.rate_limited);
        assert_eq!(store.pending(Engine::Google), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_invalid_urls_are_skipped_without_counting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        let mut store = StateStore::new();
        store.push(UrlRecord::new("ftp://example.com/a/"));
        store.push(UrlRecord::new("https://example.com/b/"));
        store.push(UrlRecord::new("https://example.com/c/"));
        let notifier = ScriptedNotifier::new(|_| Some(200));

        let summary = submit_pending(
            &mut store,
            &path,
            &notifier,
            NotificationKind::UrlUpdated,
            1,
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.submitted, 1);
        assert_eq!(notifier.calls(), vec!["https://example.com/b/"]);
        assert_eq!(store.pending(Engine::Google), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_second_run_makes_no_calls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        let mut store = store_with(3);
        let first = ScriptedNotifier::new(|_| Some(200));
        submit_pending(&mut store, &path, &first, NotificationKind::UrlUpdated, 200, Duration::ZERO)
            .await
            .unwrap();

        let mut reloaded = StateStore::load(&path).await.unwrap();
        let second = ScriptedNotifier::new(|_| Some(200));
        let summary = submit_pending(
            &mut reloaded,
            &path,
            &second,
            NotificationKind::UrlUpdated,
            200,
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(summary, GoogleRunSummary::default());
        assert!(second.calls().is_empty());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"code":403,"message":"Permission denied"}}"#),
            "Permission denied"
        );
        assert_eq!(error_message("<html>oops</html>"), "Unknown error");
        assert_eq!(error_message(r#"{"error":"flat"}"#), "Unknown error");
    }

    #[tokio::test]
    async fn test_client_sends_authenticated_notification() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/urlNotifications:publish")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::Json(json!({
                "url": "https://example.com/a/",
                "type": "URL_UPDATED"
            })))
            .with_status(200)
            .with_body(r#"{"urlNotificationMetadata":{}}"#)
            .create_async()
            .await;

        let client = GoogleIndexingClient::new(
            reqwest::Client::new(),
            StaticToken,
            format!("{}/v3/urlNotifications:publish", server.url()),
        );
        let response = client
            .notify("https://example.com/a/", NotificationKind::UrlUpdated)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_returns_error_statuses_as_responses() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/publish")
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"message":"Quota exceeded"}}"#)
            .create_async()
            .await;

        let client = GoogleIndexingClient::new(
            reqwest::Client::new(),
            StaticToken,
            format!("{}/publish", server.url()),
        );
        let response = client
            .notify("https://example.com/a/", NotificationKind::UrlDeleted)
            .await
            .unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(error_message(&response.body), "Quota exceeded");
    }

    #[tokio::test]
    async fn test_run_requires_service_account_file() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::from_yaml("site_url: https://example.com/").unwrap();
        config.csv_file = dir.path().join("links.csv");
        config.service_account_file = dir.path().join("missing.json");
        tokio::fs::write(&config.csv_file, "url\nhttps://example.com/a/\n")
            .await
            .unwrap();

        assert!(run(&config, NotificationKind::UrlUpdated).await.is_err());
        let text = tokio::fs::read_to_string(&config.csv_file).await.unwrap();
        assert_eq!(text, "url\nhttps://example.com/a/\n");
    }
}
