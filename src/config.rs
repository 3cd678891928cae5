//! Run configuration loaded from a YAML file.
//!
//! The configuration is read once in `main` and handed to each component by
//! reference. Only `site_url` is mandatory; everything else has a default.
//!
//! ```yaml
//! site_url: "https://example.com/"
//! articles_path: "content"
//! csv_file: "article_links.csv"
//! log_file: "indexing.log"
//! service_account_file: "service_account.json"
//! google:
//!   api_url: "https://indexing.googleapis.com/v3/urlNotifications:publish"
//!   request_delay_seconds: 1
//!   submission_limit: 200
//! bing:
//!   api_key: "0123456789abcdef"
//!   key_location: "https://example.com/0123456789abcdef.txt"
//! ```

use serde::Deserialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

pub const DEFAULT_GOOGLE_API_URL: &str =
    "https://indexing.googleapis.com/v3/urlNotifications:publish";
pub const DEFAULT_INDEXNOW_ENDPOINT: &str = "https://api.indexnow.org/IndexNow";
pub const DEFAULT_SUBMISSION_LIMIT: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the published site, always ending in `/`.
    pub site_url: String,
    /// Root of the article sources scanned by the link extractor.
    #[serde(default = "default_articles_path")]
    pub articles_path: PathBuf,
    /// The state store.
    #[serde(default = "default_csv_file")]
    pub csv_file: PathBuf,
    /// Optional file receiving a copy of all log output.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Google service-account key (JSON).
    #[serde(default = "default_service_account_file")]
    pub service_account_file: PathBuf,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub bing: BingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub api_url: String,
    /// Pause after each submission attempt.
    pub request_delay_seconds: u64,
    /// Maximum successful submissions per run.
    pub submission_limit: usize,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GOOGLE_API_URL.to_string(),
            request_delay_seconds: 1,
            submission_limit: DEFAULT_SUBMISSION_LIMIT,
        }
    }
}

impl GoogleConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BingConfig {
    pub api_key: Option<String>,
    /// Public URL of the key file. Defaults to `{site_url}{api_key}.txt`.
    pub key_location: Option<String>,
    pub endpoint: String,
}

impl Default for BingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            key_location: None,
            endpoint: DEFAULT_INDEXNOW_ENDPOINT.to_string(),
        }
    }
}

fn default_articles_path() -> PathBuf {
    PathBuf::from("content")
}

fn default_csv_file() -> PathBuf {
    PathBuf::from("article_links.csv")
}

fn default_service_account_file() -> PathBuf {
    PathBuf::from("service_account.json")
}

impl Config {
    /// Read and validate the configuration file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|e| format!("cannot read config file {}: {e}", path.display()))?;
        let config = Self::from_yaml(&text)?;
        info!(site_url = %config.site_url, csv_file = %config.csv_file.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, Box<dyn Error>> {
        let mut config: Config = serde_yaml::from_str(text)?;
        let site_url = config.site_url.trim();
        if site_url.is_empty() {
            return Err("site_url must not be empty".into());
        }
        config.site_url = if site_url.ends_with('/') {
            site_url.to_string()
        } else {
            format!("{site_url}/")
        };
        Ok(config)
    }

    /// Host name sent as the IndexNow `host` field.
    pub fn site_host(&self) -> String {
        url::Url::parse(&self.site_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.site_url.trim_end_matches('/').to_string())
    }

    /// IndexNow key and key location, or an error if no key is configured.
    pub fn indexnow_credentials(&self) -> Result<(String, String), Box<dyn Error>> {
        let key = self
            .bing
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or("bing.api_key is not configured")?;
        let location = self
            .bing
            .key_location
            .clone()
            .unwrap_or_else(|| format!("{}{key}.txt", self.site_url));
        Ok((key.to_string(), location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml("site_url: https://example.com").unwrap();
        assert_eq!(config.site_url, "https://example.com/");
        assert_eq!(config.csv_file, PathBuf::from("article_links.csv"));
        assert_eq!(config.google.submission_limit, 200);
        assert_eq!(config.google.request_delay(), Duration::from_secs(1));
        assert_eq!(config.bing.endpoint, DEFAULT_INDEXNOW_ENDPOINT);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_yaml(
            r#"
site_url: "https://blog.example.org/"
articles_path: "site/content"
csv_file: "state/links.csv"
log_file: "indexing.log"
service_account_file: "sa.json"
google:
  api_url: "http://localhost:9999/publish"
  request_delay_seconds: 0
  submission_limit: 5
bing:
  api_key: "abc123"
  key_location: "https://blog.example.org/keys/abc123.txt"
"#,
        )
        .unwrap();
        assert_eq!(config.articles_path, PathBuf::from("site/content"));
        assert_eq!(config.google.submission_limit, 5);
        assert_eq!(config.google.api_url, "http://localhost:9999/publish");
        assert_eq!(config.site_host(), "blog.example.org");
        let (key, location) = config.indexnow_credentials().unwrap();
        assert_eq!(key, "abc123");
        assert_eq!(location, "https://blog.example.org/keys/abc123.txt");
    }

    #[test]
    fn test_key_location_defaults_to_site_root() {
        let config =
            Config::from_yaml("site_url: https://example.com/\nbing:\n  api_key: k1\n").unwrap();
        let (_, location) = config.indexnow_credentials().unwrap();
        assert_eq!(location, "https://example.com/k1.txt");
    }

    #[test]
    fn test_missing_indexnow_key_is_an_error() {
        let config = Config::from_yaml("site_url: https://example.com/").unwrap();
        assert!(config.indexnow_credentials().is_err());
    }

    #[test]
    fn test_site_url_is_required() {
        assert!(Config::from_yaml("csv_file: x.csv").is_err());
        assert!(Config::from_yaml("site_url: ''").is_err());
    }
}
