use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// Refresh a little early so a token never expires mid-request.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The subset of a Google service-account key file the dashboard needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// Reads and validates a key file. Any failure is a configuration error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("cannot read credential file {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let account: ServiceAccount = serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("invalid credential file: {}", e)))?;
        if account.client_email.is_empty() {
            return Err(AppError::ConfigError("credential file has no client_email".to_string()));
        }
        account.encoding_key()?;
        Ok(account)
    }

    pub fn encoding_key(&self) -> Result<EncodingKey> {
        Ok(EncodingKey::from_rsa_pem(self.private_key.as_bytes())?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges signed service-account assertions for OAuth2 bearer tokens,
/// caching the token until shortly before it expires.
pub struct TokenProvider {
    account: ServiceAccount,
    key: EncodingKey,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(account: ServiceAccount, client: Client) -> Result<Self> {
        let key = account.encoding_key()?;
        Ok(TokenProvider {
            account,
            key,
            client,
            cached: Mutex::new(None),
        })
    }

    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();

        let claims = Claims {
            iss: self.account.client_email.clone(),
            scope: BIGQUERY_SCOPE.to_string(),
            aud: self.account.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        Ok(encode(&header, &claims, &self.key)?)
    }

    /// Drops the cached token so the next request re-authenticates.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at > now {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!(client_email = %self.account.client_email, "Requesting new access token");
        let assertion = self.assertion(now)?;
        let res = self
            .client
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(AppError::ConnectionError(format!(
                "token exchange failed (status {}): {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = res
            .json()
            .await
            .map_err(|e| AppError::ConnectionError(format!("invalid token response: {}", e)))?;

        let lifetime = (token.expires_in - EXPIRY_MARGIN_SECS).max(0);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: now + Duration::seconds(lifetime),
        });

        Ok(token.access_token)
    }
}
