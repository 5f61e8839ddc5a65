use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::reddit::SubredditInfo;

const KEY_PREFIX: &str = "ingest:subreddit:";

/// Redis-backed cache of subreddit about-info. Without a client every
/// lookup is a miss. Redis failures are logged and also count as a miss.
#[derive(Clone)]
pub struct SubredditCache {
    client: Option<redis::Client>,
    ttl: Duration,
}

impl SubredditCache {
    pub fn new(client: Option<redis::Client>, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    fn key(subreddit: &str) -> String {
        format!("{KEY_PREFIX}{}", subreddit.to_ascii_lowercase())
    }

    pub async fn get(&self, subreddit: &str) -> Option<SubredditInfo> {
        let client = self.client.as_ref()?;
        let result: redis::RedisResult<Option<String>> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            conn.get(Self::key(subreddit)).await
        }
        .await;

        match result {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(info) => {
                    debug!("Cache hit for r/{subreddit}");
                    Some(info)
                }
                Err(e) => {
                    warn!("Discarding unreadable cache entry for r/{subreddit}: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Redis lookup for r/{subreddit} failed: {e}");
                None
            }
        }
    }

    pub async fn put(&self, subreddit: &str, info: &SubredditInfo) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        if self.ttl.is_zero() {
            return;
        }
        let raw = match serde_json::to_string(info) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize subreddit info for r/{subreddit}: {e}");
                return;
            }
        };

        let result: redis::RedisResult<()> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            conn.set_ex(Self::key(subreddit), raw, self.ttl.as_secs() as _)
                .await
        }
        .await;
        if let Err(e) = result {
            warn!("Redis write for r/{subreddit} failed: {e}");
        }
    }

    pub async fn ping(&self) -> Option<bool> {
        let client = self.client.as_ref()?;
        let result: redis::RedisResult<String> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async(&mut conn).await
        }
        .await;
        Some(result.is_ok())
    }
}
