use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

pub const SOURCE_REDDIT: &str = "reddit";

pub const MAX_SOURCE_LEN: usize = 50;
pub const MAX_SUBREDDIT_LEN: usize = 100;
pub const MAX_AUTHOR_LEN: usize = 100;
pub const MAX_URL_LEN: usize = 500;

/// A stored row of `reddit_posts`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Post {
    pub id: i64,
    pub source: String,
    pub subreddit: String,
    pub title: String,
    pub url: String,
    pub author: String,
    pub score: i64,
    pub comments: i64,
    pub normalized_score: f64,
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub top_comments: Option<Value>,
    pub post_text: Option<String>,
}

/// A canonical post that has not been written yet. `id` is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPost {
    pub source: String,
    pub subreddit: String,
    pub title: String,
    pub url: String,
    pub author: String,
    pub score: i64,
    pub comments: i64,
    pub normalized_score: f64,
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub top_comments: Option<Value>,
    pub post_text: Option<String>,
    /// Platform NSFW flag. Used by the content filter, not persisted.
    #[serde(skip)]
    pub over_18: bool,
}

impl NewPost {
    /// Checks the row-level invariants the table enforces.
    /// Returns a human-readable reason on the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        let required = [
            ("source", &self.source),
            ("subreddit", &self.subreddit),
            ("title", &self.title),
            ("url", &self.url),
            ("author", &self.author),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{field} is empty"));
            }
        }

        let limits = [
            ("source", &self.source, MAX_SOURCE_LEN),
            ("subreddit", &self.subreddit, MAX_SUBREDDIT_LEN),
            ("author", &self.author, MAX_AUTHOR_LEN),
            ("url", &self.url, MAX_URL_LEN),
        ];
        for (field, value, max) in limits {
            let len = value.chars().count();
            if len > max {
                return Err(format!("{field} is {len} characters, limit is {max}"));
            }
        }

        if self.score < 0 || self.comments < 0 {
            return Err(format!(
                "counters must be non-negative (score {}, comments {})",
                self.score, self.comments
            ));
        }
        if !self.normalized_score.is_finite() {
            return Err("normalized_score is not finite".to_string());
        }
        if self.created_at > self.fetched_at {
            return Err("created_at is later than fetched_at".to_string());
        }
        Ok(())
    }

    pub fn into_post(self, id: i64) -> Post {
        Post {
            id,
            source: self.source,
            subreddit: self.subreddit,
            title: self.title,
            url: self.url,
            author: self.author,
            score: self.score,
            comments: self.comments,
            normalized_score: self.normalized_score,
            created_at: self.created_at,
            fetched_at: self.fetched_at,
            top_comments: self.top_comments,
            post_text: self.post_text,
        }
    }
}

/// One element of the `top_comments` JSONB array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopComment {
    pub id: Option<String>,
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub is_submitter: bool,
}
