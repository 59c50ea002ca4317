use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info};
use url::Url;

use crate::app::{PostwatchError, Result};

/// Tokens are renewed this long before Reddit says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Application-only OAuth2 tokens (client credentials grant).
pub struct TokenProvider {
    client: Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(client: Client, auth_base: &Url, client_id: String, client_secret: String) -> Result<Self> {
        Ok(Self {
            client,
            token_url: auth_base.join("api/v1/access_token")?,
            client_id,
            client_secret,
            cached: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, requesting a new one when needed.
    ///
    /// Concurrent callers wait on the same refresh instead of each starting one.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        info!("Requesting access token");
        let response = self
            .client
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!(%status, "Failed to get access token");
            return Err(PostwatchError::Auth(format!(
                "token request failed with status {}",
                status
            )));
        }

        let body: AccessTokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::zero());

        info!(%expires_at, "Access token received");
        *cached = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at,
        });

        Ok(body.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url() {
        let base = Url::parse("https://www.reddit.com/").unwrap();
        let provider =
            TokenProvider::new(Client::new(), &base, "id".into(), "secret".into()).unwrap();
        assert_eq!(
            provider.token_url.as_str(),
            "https://www.reddit.com/api/v1/access_token"
        );
    }

    #[test]
    fn test_token_response_deserializes() {
        let body = r#"{"access_token":"abc","token_type":"bearer","expires_in":86400,"scope":"*"}"#;
        let parsed: AccessTokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_token, "abc");
        assert_eq!(parsed.expires_in, 86400);
    }
}
