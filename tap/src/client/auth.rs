use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{Error, Result};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_SKEW_SECS) < expires_at,
            None => true,
        }
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a usable access token. Failures are authentication errors.
    async fn authorize(&self) -> Result<Credential>;
}

/// Serves a fixed access token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn authorize(&self) -> Result<Credential> {
        if self.token.trim().is_empty() {
            return Err(Error::Auth("access token is empty".into()));
        }
        Ok(Credential {
            access_token: self.token.clone(),
            expires_at: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges a refresh token for access tokens and caches them until they expire.
pub struct OAuthRefreshProvider {
    http: rquest::Client,
    token_uri: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<Credential>>,
}

impl OAuthRefreshProvider {
    pub fn new(
        http: rquest::Client,
        token_uri: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Self {
        Self {
            http,
            token_uri: token_uri.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            cached: Mutex::new(None),
        }
    }

    fn refresh_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("refresh_token", &self.refresh_token)
            .finish()
    }

    async fn refresh(&self) -> Result<Credential> {
        debug!(token_uri = %self.token_uri, "Refreshing OAuth access token");

        let response = self
            .http
            .post(self.token_uri.as_str())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(self.refresh_body())
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Auth(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("malformed token response: {}", e)))?;

        info!(expires_in = ?token.expires_in, "Obtained OAuth access token");

        Ok(Credential {
            access_token: token.access_token,
            expires_at: token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

#[async_trait]
impl CredentialProvider for OAuthRefreshProvider {
    async fn authorize(&self) -> Result<Credential> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh(Utc::now()) {
                return Ok(credential.clone());
            }
        }

        let credential = self.refresh().await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }
}
