//! Google service-account authentication for the Indexing API.
//!
//! A service-account key file is turned into short-lived bearer tokens with
//! the OAuth 2.0 JWT-bearer grant: an RS256-signed assertion is posted to the
//! key's `token_uri` and exchanged for an access token. Tokens are cached
//! until shortly before they expire.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, info, instrument};

pub const INDEXING_SCOPE: &str = "https://www.googleapis.com/auth/indexing";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token's stated expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// The parts of a service-account key file that the grant needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn from_file(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = fs::read_to_string(path).await?;
        let key: ServiceAccountKey = serde_json::from_str(&text)?;
        info!(client_email = %key.client_email, "Loaded service account key");
        Ok(key)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Issues bearer tokens for one service account.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.key.client_email)
            .field("token_uri", &self.key.token_uri)
            .finish()
    }
}

impl ServiceAccountAuth {
    /// Fails if the private key is not a valid RSA PEM.
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self, Box<dyn Error>> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            key,
            encoding_key,
            http,
            cached: Mutex::new(None),
        })
    }

    fn cached_token(&self, now: i64) -> Option<String> {
        let guard = self.cached.lock().ok()?;
        guard
            .as_ref()
            .filter(|t| t.expires_at - EXPIRY_MARGIN_SECS > now)
            .map(|t| t.value.clone())
    }

    fn assertion(&self, now: i64) -> Result<String, Box<dyn Error>> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: INDEXING_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?)
    }

    /// A valid access token, fetched from the token endpoint when the cached
    /// one is missing or about to expire.
    #[instrument(level = "debug", skip_all)]
    pub async fn access_token(&self) -> Result<String, Box<dyn Error>> {
        let now = Utc::now().timestamp();
        if let Some(token) = self.cached_token(now) {
            return Ok(token);
        }

        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("token exchange failed ({status}): {body}").into());
        }
        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Obtained access token");

        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(CachedToken {
                value: token.access_token.clone(),
                expires_at: now + token.expires_in,
            });
        }
        Ok(token.access_token)
    }
}
