//! Service-account OAuth: sign an RS256 assertion and exchange it for an
//! access token, cached per scope until shortly before it expires.

use crate::config::GoogleConfig;
use crate::error::{read_success_body, UpstreamError, UpstreamResult};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub const SERVICE: &str = "Google";

pub const SCOPE_DOCS_READONLY: &str = "https://www.googleapis.com/auth/documents.readonly";
pub const SCOPE_SPREADSHEETS: &str = "https://www.googleapis.com/auth/spreadsheets";

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the provider-reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

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
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Shared by the Docs source and the Sheets log
pub struct GoogleAuth {
    client: Client,
    client_email: Option<String>,
    private_key: Option<String>,
    tokens: RwLock<HashMap<&'static str, CachedToken>>,
}

impl GoogleAuth {
    pub fn new(config: &GoogleConfig) -> UpstreamResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, &e))?;
        Ok(Self {
            client,
            client_email: config.client_email.clone(),
            private_key: config.private_key.clone(),
            tokens: RwLock::new(HashMap::new()),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_email(&self) -> Option<&str> {
        self.client_email.as_deref()
    }

    fn credentials(&self) -> UpstreamResult<(&str, &str)> {
        match (self.client_email.as_deref(), self.private_key.as_deref()) {
            (Some(email), Some(key)) => Ok((email, key)),
            (email, _) => Err(UpstreamError::NotConfigured {
                service: SERVICE,
                missing: if email.is_none() {
                    "GOOGLE_CLIENT_EMAIL".to_string()
                } else {
                    "GOOGLE_PRIVATE_KEY".to_string()
                },
            }),
        }
    }

    /// Signed JWT assertion for the token exchange
    fn assertion(&self, scope: &str) -> UpstreamResult<String> {
        let (email, key) = self.credentials()?;
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: email,
            scope,
            aud: TOKEN_URL,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let key = EncodingKey::from_rsa_pem(key.as_bytes())
            .map_err(|e| UpstreamError::decode(SERVICE, format!("invalid private key: {e}")))?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| UpstreamError::decode(SERVICE, format!("failed to sign assertion: {e}")))
    }

    /// Bearer token for `scope`, fetching a new one when the cached token is
    /// missing or about to expire.
    pub async fn access_token(&self, scope: &'static str) -> UpstreamResult<String> {
        {
            let tokens = self.tokens.read().await;
            if let Some(token) = tokens.get(scope) {
                if Instant::now() < token.expires_at {
                    return Ok(token.value.clone());
                }
            }
        }

        let assertion = self.assertion(scope)?;
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, &e))?;

        let body = read_success_body(SERVICE, response).await?;
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::decode(SERVICE, e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        self.tokens.write().await.insert(
            scope,
            CachedToken {
                value: token.access_token.clone(),
                expires_at: Instant::now() + lifetime,
            },
        );
        tracing::debug!(scope, "Google access token refreshed");

        Ok(token.access_token)
    }

    #[cfg(test)]
    pub async fn seed_token(&self, scope: &'static str, value: &str, valid_for: Duration) {
        self.tokens.write().await.insert(
            scope,
            CachedToken {
                value: value.to_string(),
                expires_at: Instant::now() + valid_for,
            },
        );
    }
}
