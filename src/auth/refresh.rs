//! OAuth refresh-token exchange.
//!
//! Accounts carry long-lived refresh tokens; this module trades them for
//! short-lived access tokens at Google's token endpoint. The interactive
//! flows that mint refresh tokens in the first place live outside the
//! core; only this exchange is needed at serve time.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::DEFAULT_OAUTH_CONFIG;
use crate::error::{ProxyError, Result};
use crate::transport::http::mask_token;

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    /// The bearer token.
    pub access_token: String,

    /// Lifetime in seconds, when the endpoint reported one.
    pub expires_in: Option<i64>,
}

/// Exchanges a refresh token for an access token.
///
/// Object-safe so tests can substitute a stub.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform the exchange.
    ///
    /// An `invalid_grant` rejection surfaces as [`ProxyError::AuthInvalid`]
    /// with the account email left for the caller to fill in.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken>;
}

/// Production refresher against Google's token endpoint.
pub struct GoogleTokenRefresher {
    client: reqwest::Client,
}

impl GoogleTokenRefresher {
    /// Create a refresher with its own HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for GoogleTokenRefresher {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let params = [
            ("client_id", DEFAULT_OAUTH_CONFIG.client_id),
            ("client_secret", DEFAULT_OAUTH_CONFIG.client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(DEFAULT_OAUTH_CONFIG.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Token refresh rejected");
            if body.contains("invalid_grant") {
                return Err(ProxyError::AuthInvalid {
                    account_email: String::new(),
                    reason: "invalid_grant".to_string(),
                });
            }
            return Err(ProxyError::api(status.as_u16(), body));
        }

        let token: TokenResponse = response.json().await?;
        debug!(
            token = %mask_token(&token.access_token),
            expires_in = ?token.expires_in,
            "Access token refreshed"
        );

        Ok(RefreshedToken {
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{"access_token": "ya29.abc", "expires_in": 3599, "token_type": "Bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "ya29.abc");
        assert_eq!(token.expires_in, Some(3599));
    }

    #[test]
    fn test_token_response_without_expiry() {
        let json = r#"{"access_token": "ya29.abc"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(token.expires_in.is_none());
    }
}
