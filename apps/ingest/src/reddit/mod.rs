/// Reddit API client: the only module that talks to Reddit.
///
/// Every request passes through the token-bucket throttle and the token
/// holder, in that order. Listings are exposed as lazy streams so the
/// ingestion pipeline can process, and abandon, a run record by record.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::try_stream;
use chrono::Utc;
use futures::Stream;
use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod auth;
pub mod models;
pub mod rate_limit;

pub use auth::{AuthError, TokenHolder, TokenSource};
pub use models::{FetchedPost, RawComment, RawPost, SubredditInfo};

use crate::metrics::RedditMetrics;
use models::{Listing, Thing};
use rate_limit::RateLimiter;

pub const MAX_LISTING_LIMIT: usize = 100;
const PAGE_SIZE: usize = 100;
const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("rate limit exceeded, next slot in {}s", retry_after.as_secs())]
    RateLimitExceeded { retry_after: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingMode {
    Hot,
    New,
    #[default]
    Top,
    Rising,
}

impl ListingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingMode::Hot => "hot",
            ListingMode::New => "new",
            ListingMode::Top => "top",
            ListingMode::Rising => "rising",
        }
    }
}

impl fmt::Display for ListingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingMode {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(ListingMode::Hot),
            "new" => Ok(ListingMode::New),
            "top" => Ok(ListingMode::Top),
            "rising" => Ok(ListingMode::Rising),
            other => Err(FetchError::InvalidRequest(format!(
                "mode must be one of hot, new, top, rising (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub api_base: String,
    pub auth_url: String,
    pub user_agent: String,
    pub token_source: TokenSource,
    pub rate_limit_per_minute: u32,
    pub max_throttle_wait: Duration,
    /// Top comments fetched per post; 0 skips the comment requests.
    pub comment_limit: usize,
    pub request_timeout: Duration,
}

pub struct RedditClient {
    http: Client,
    api_base: String,
    user_agent: String,
    comment_limit: usize,
    tokens: Arc<TokenHolder>,
    limiter: RateLimiter,
    metrics: Arc<RedditMetrics>,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        let tokens = Arc::new(TokenHolder::new(
            http.clone(),
            config.auth_url,
            config.user_agent.clone(),
            config.token_source,
        ));
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            user_agent: config.user_agent,
            comment_limit: config.comment_limit,
            tokens,
            limiter: RateLimiter::new(config.rate_limit_per_minute, config.max_throttle_wait),
            metrics: Arc::new(RedditMetrics::default()),
        })
    }

    /// Listing request counters, shared with the `/metrics` route.
    pub fn metrics(&self) -> Arc<RedditMetrics> {
        self.metrics.clone()
    }

    /// Streams up to `limit` posts of `subreddit` in listing order.
    ///
    /// The stream is lazy: pages (and per-post comment requests) are only
    /// requested as the caller polls. Any error ends the stream.
    pub fn listing<'a>(
        &'a self,
        subreddit: &'a str,
        mode: ListingMode,
        limit: usize,
    ) -> impl Stream<Item = Result<FetchedPost, FetchError>> + Send + 'a {
        try_stream! {
            validate_subreddit(subreddit)?;
            if limit == 0 || limit > MAX_LISTING_LIMIT {
                Err::<(), _>(FetchError::InvalidRequest(format!(
                    "limit must be between 1 and {MAX_LISTING_LIMIT}"
                )))?;
            }

            let path = format!("/r/{subreddit}/{}", mode.as_str());
            let mut remaining = limit;
            let mut after: Option<String> = None;

            while remaining > 0 {
                let mut query = vec![
                    ("limit", remaining.min(PAGE_SIZE).to_string()),
                    ("raw_json", "1".to_string()),
                ];
                if let Some(cursor) = &after {
                    query.push(("after", cursor.clone()));
                }

                let started = Instant::now();
                let page = self.get_json::<Listing<serde_json::Value>>(&path, &query).await;
                self.metrics.record(subreddit, mode, started.elapsed());
                let page = page?;
                let page_len = page.data.children.len();
                debug!("Received {page_len} listing items from r/{subreddit}/{mode}");

                for child in page.data.children {
                    if remaining == 0 {
                        break;
                    }
                    if child.kind != "t3" {
                        continue;
                    }
                    remaining -= 1;
                    // Decode per item: one malformed item must not sink the page.
                    let (raw, decode_error) = match serde_json::from_value::<RawPost>(child.data.clone()) {
                        Ok(raw) => (raw, None),
                        Err(e) => {
                            warn!("Listing item in r/{subreddit} did not decode: {e}");
                            (RawPost::salvage(&child.data), Some(e.to_string()))
                        }
                    };
                    let top_comments = if decode_error.is_none() {
                        self.top_comments(&raw).await
                    } else {
                        Vec::new()
                    };
                    yield FetchedPost {
                        collection: subreddit.to_string(),
                        raw,
                        top_comments,
                        fetched_at: Utc::now(),
                        decode_error,
                    };
                }

                after = page.data.after;
                if after.is_none() || page_len == 0 {
                    break;
                }
            }
        }
    }

    /// Looks up `/r/{name}/about`. A missing or banned subreddit is `NotFound`.
    pub async fn subreddit_info(&self, subreddit: &str) -> Result<SubredditInfo, FetchError> {
        validate_subreddit(subreddit)?;
        let thing: Thing<serde_json::Value> = self
            .get_json(
                &format!("/r/{subreddit}/about"),
                &[("raw_json", "1".to_string())],
            )
            .await?;
        if thing.kind != "t5" {
            return Err(FetchError::NotFound(format!("r/{subreddit}")));
        }
        Ok(serde_json::from_value(thing.data)?)
    }

    /// Top-level comments sorted by score. Failures degrade to no comments.
    async fn top_comments(&self, post: &RawPost) -> Vec<RawComment> {
        let Some(id) = post.id.as_deref() else {
            return Vec::new();
        };
        if self.comment_limit == 0 {
            return Vec::new();
        }

        let query = [
            ("limit", self.comment_limit.to_string()),
            ("sort", "top".to_string()),
            ("depth", "1".to_string()),
            ("raw_json", "1".to_string()),
        ];
        // Response is [post listing, comment listing]
        let listings: Vec<Listing<RawComment>> =
            match self.get_json(&format!("/comments/{id}"), &query).await {
                Ok(l) => l,
                Err(e) => {
                    warn!("Failed to fetch comments for post {id}: {e}");
                    return Vec::new();
                }
            };

        listings
            .into_iter()
            .nth(1)
            .map(|listing| {
                listing
                    .data
                    .children
                    .into_iter()
                    .filter(|c| c.kind == "t1")
                    .map(|c| c.data)
                    .filter(|c| !matches!(c.body.as_deref(), Some("[deleted]" | "[removed]")))
                    .take(self.comment_limit)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// GETs `path` and decodes the JSON body.
    /// Retries transport errors and 5xx with exponential backoff, waits out
    /// 429s that fit inside the throttle bound, and renews the token once on 401.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.api_base, path);
        let mut last_error: Option<FetchError> = None;
        let mut pending_delay: Option<Duration> = None;
        let mut reauthenticated = false;

        for attempt in 0..MAX_RETRIES {
            if let Some(delay) = pending_delay.take() {
                warn!(
                    "Reddit request to {} attempt {} failed, retrying after {}ms...",
                    path,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            self.limiter.acquire().await?;
            let token = self.tokens.bearer().await?;

            let response = self
                .http
                .get(&url)
                .query(query)
                .bearer_auth(&token)
                .header(USER_AGENT, &self.user_agent)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(FetchError::Http(e));
                    pending_delay = Some(backoff(attempt));
                    continue;
                }
            };

            let status = response.status();
            match status {
                StatusCode::UNAUTHORIZED => {
                    if reauthenticated {
                        return Err(AuthError::Rejected {
                            status: status.as_u16(),
                            message: "API rejected a freshly renewed token".to_string(),
                        }
                        .into());
                    }
                    warn!("Reddit rejected the access token, renewing");
                    self.tokens.invalidate().await?;
                    reauthenticated = true;
                    last_error = Some(FetchError::Api {
                        status: status.as_u16(),
                        message: "unauthorized".to_string(),
                    });
                    continue;
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after =
                        parse_retry_after(response.headers()).unwrap_or(DEFAULT_RETRY_AFTER);
                    if retry_after > self.limiter.max_wait() {
                        return Err(FetchError::RateLimitExceeded { retry_after });
                    }
                    last_error = Some(FetchError::RateLimitExceeded { retry_after });
                    pending_delay = Some(retry_after);
                    continue;
                }
                StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                    return Err(FetchError::NotFound(path.to_string()));
                }
                s if s.is_server_error() => {
                    let body = response.text().await.unwrap_or_default();
                    last_error = Some(FetchError::Api {
                        status: s.as_u16(),
                        message: body,
                    });
                    pending_delay = Some(backoff(attempt));
                    continue;
                }
                s if !s.is_success() => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(FetchError::Api {
                        status: s.as_u16(),
                        message: body,
                    });
                }
                _ => {}
            }

            let body = response.text().await?;
            return Ok(serde_json::from_str(&body)?);
        }

        Err(last_error.unwrap_or(FetchError::Api {
            status: 0,
            message: format!("no response from {path}"),
        }))
    }
}

fn backoff(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * (1 << attempt)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Subreddit names are 2-21 characters of `[A-Za-z0-9_]`.
pub fn validate_subreddit(name: &str) -> Result<(), FetchError> {
    let valid = (2..=21).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(FetchError::InvalidRequest(format!(
            "'{name}' is not a valid subreddit name"
        )))
    }
}
