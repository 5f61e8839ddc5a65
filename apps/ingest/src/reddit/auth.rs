//! OAuth2 bearer token lifecycle for the Reddit API.
//!
//! `TokenHolder` is the only writer of the current token. Every request asks
//! it for a bearer string; renewal happens inside the holder's lock, so two
//! concurrent fetches never renew twice.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

/// Renew when the token has less than this much life left.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);
const MAX_RENEW_ATTEMPTS: u32 = 3;
const RENEW_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint rejected the client credentials (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("token renewal failed after {attempts} attempts: {last_error}")]
    RenewalExhausted { attempts: u32, last_error: String },

    #[error("static access token was rejected and no client credentials are configured")]
    StaticTokenRejected,
}

/// Where bearer tokens come from.
#[derive(Clone)]
pub enum TokenSource {
    /// Client-credentials grant, renewable.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    /// Pre-obtained token. Used as-is until the API rejects it.
    Static(String),
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            TokenSource::Static(_) => f.write_str("Static(<redacted>)"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    // None for static tokens: expiry is unknown, trust until rejected
    expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_fresh(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(now) > REFRESH_MARGIN,
            None => true,
        }
    }
}

pub struct TokenHolder {
    http: Client,
    auth_url: String,
    user_agent: String,
    source: TokenSource,
    current: Mutex<Option<AccessToken>>,
}

impl TokenHolder {
    pub fn new(http: Client, auth_url: String, user_agent: String, source: TokenSource) -> Self {
        let current = match &source {
            TokenSource::Static(value) => Some(AccessToken {
                value: value.clone(),
                expires_at: None,
            }),
            TokenSource::ClientCredentials { .. } => None,
        };
        Self {
            http,
            auth_url,
            user_agent,
            source,
            current: Mutex::new(current),
        }
    }

    /// Returns a bearer token with at least `REFRESH_MARGIN` of life left,
    /// renewing first if needed.
    pub async fn bearer(&self) -> Result<String, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        let renewed = self.renew().await?;
        let value = renewed.value.clone();
        *current = Some(renewed);
        Ok(value)
    }

    /// Drops the current token after the API rejected it with 401.
    pub async fn invalidate(&self) -> Result<(), AuthError> {
        if matches!(self.source, TokenSource::Static(_)) {
            return Err(AuthError::StaticTokenRejected);
        }
        *self.current.lock().await = None;
        Ok(())
    }

    async fn renew(&self) -> Result<AccessToken, AuthError> {
        let (client_id, client_secret) = match &self.source {
            TokenSource::ClientCredentials {
                client_id,
                client_secret,
            } => (client_id, client_secret),
            TokenSource::Static(_) => return Err(AuthError::StaticTokenRejected),
        };

        let mut last_error = String::new();
        for attempt in 0..MAX_RENEW_ATTEMPTS {
            if attempt > 0 {
                let delay = RENEW_BASE_DELAY * (1 << (attempt - 1));
                warn!(
                    "Token renewal attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .http
                .post(&self.auth_url)
                .basic_auth(client_id, Some(client_secret))
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .form(&[("grant_type", "client_credentials")])
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
                let message = response.text().await.unwrap_or_default();
                return Err(AuthError::Rejected {
                    status: status.as_u16(),
                    message,
                });
            }
            if !status.is_success() {
                last_error = format!("token endpoint returned {status}");
                continue;
            }

            match response.json::<TokenResponse>().await {
                Ok(body) => {
                    info!("Renewed Reddit access token (expires in {}s)", body.expires_in);
                    return Ok(AccessToken {
                        value: body.access_token,
                        expires_at: Some(Instant::now() + Duration::from_secs(body.expires_in)),
                    });
                }
                Err(e) => last_error = format!("malformed token response: {e}"),
            }
        }

        Err(AuthError::RenewalExhausted {
            attempts: MAX_RENEW_ATTEMPTS,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn holder(server: &MockServer) -> TokenHolder {
        TokenHolder::new(
            Client::new(),
            format!("{}/api/v1/access_token", server.uri()),
            "ingest-test/0.1".to_string(),
            TokenSource::ClientCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
        )
    }

    #[test]
    fn test_token_inside_margin_is_stale() {
        let now = Instant::now();
        let token = AccessToken {
            value: "t".to_string(),
            expires_at: Some(now + Duration::from_secs(4 * 60)),
        };
        assert!(!token.is_fresh(now));
    }

    #[test]
    fn test_token_outside_margin_is_fresh() {
        let now = Instant::now();
        let token = AccessToken {
            value: "t".to_string(),
            expires_at: Some(now + Duration::from_secs(3600)),
        };
        assert!(token.is_fresh(now));
    }

    #[tokio::test]
    async fn test_long_lived_token_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let holder = holder(&server);
        assert_eq!(holder.bearer().await.unwrap(), "abc");
        assert_eq!(holder.bearer().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_token_near_expiry_is_renewed_before_use() {
        let server = MockServer::start().await;
        // expires_in below the refresh margin: every request must renew
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "short",
                "expires_in": 120
            })))
            .expect(2)
            .mount(&server)
            .await;

        let holder = holder(&server);
        holder.bearer().await.unwrap();
        holder.bearer().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad creds"))
            .expect(1)
            .mount(&server)
            .await;

        let err = holder(&server).bearer().await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_renewal_gives_up_after_bounded_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(503))
            .expect(u64::from(MAX_RENEW_ATTEMPTS))
            .mount(&server)
            .await;

        let err = holder(&server).bearer().await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::RenewalExhausted {
                attempts: MAX_RENEW_ATTEMPTS,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_static_token_cannot_be_invalidated() {
        let holder = TokenHolder::new(
            Client::new(),
            "http://unused".to_string(),
            "ua".to_string(),
            TokenSource::Static("pre".to_string()),
        );
        assert_eq!(holder.bearer().await.unwrap(), "pre");
        assert!(matches!(
            holder.invalidate().await,
            Err(AuthError::StaticTokenRejected)
        ));
    }
}
