use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::posts::dedup::canonical_url;
use crate::posts::models::{NewPost, TopComment, SOURCE_REDDIT};
use crate::posts::scoring::{compute_normalized_score, ScoringPolicy};
use crate::reddit::{FetchedPost, RawComment};

/// Why a listing item could not become a canonical post.
/// Per-record and recoverable: the item is dropped and the run continues.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid created_utc {0}")]
    InvalidTimestamp(f64),

    #[error("negative {field}: {value}")]
    NegativeCounter { field: &'static str, value: i64 },

    #[error("malformed listing item: {0}")]
    Malformed(String),
}

/// Maps one fetched listing item to a canonical post. Pure: the same input
/// always yields the same output.
///
/// `fetched_at` is raised to `created_at` when the platform clock runs ahead
/// of ours, so `created_at <= fetched_at` always holds.
pub fn normalize(
    fetched: &FetchedPost,
    policy: &ScoringPolicy,
) -> Result<NewPost, NormalizationError> {
    if let Some(reason) = &fetched.decode_error {
        return Err(NormalizationError::Malformed(reason.clone()));
    }
    let raw = &fetched.raw;

    let title = required_text(raw.title.as_deref(), "title")?;
    let author = required_text(raw.author.as_deref(), "author")?;
    let raw_url = required_text(raw.url.as_deref(), "url")?;
    let url = canonical_url(&raw_url).map_err(|reason| NormalizationError::InvalidUrl {
        url: raw_url.clone(),
        reason,
    })?;
    let created_utc = raw
        .created_utc
        .ok_or(NormalizationError::MissingField("created_at"))?;
    let created_at = timestamp(created_utc)?;

    let score = non_negative(raw.score.unwrap_or(0), "score")?;
    let comments = non_negative(raw.num_comments.unwrap_or(0), "comments")?;

    let subreddit = raw
        .subreddit
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(fetched.collection.as_str())
        .to_ascii_lowercase();

    let fetched_at = fetched.fetched_at.max(created_at);
    let normalized_score =
        compute_normalized_score(score, comments, fetched_at - created_at, policy);

    let top_comments: Vec<TopComment> = fetched
        .top_comments
        .iter()
        .filter_map(to_top_comment)
        .collect();
    let top_comments = if top_comments.is_empty() {
        None
    } else {
        serde_json::to_value(&top_comments).ok()
    };

    let post_text = raw
        .selftext
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(NewPost {
        source: SOURCE_REDDIT.to_string(),
        subreddit,
        title,
        url,
        author,
        score,
        comments,
        normalized_score,
        created_at,
        fetched_at,
        top_comments,
        post_text,
        over_18: raw.over_18.unwrap_or(false),
    })
}

fn required_text(value: Option<&str>, field: &'static str) -> Result<String, NormalizationError> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(NormalizationError::MissingField(field))
}

fn non_negative(value: i64, field: &'static str) -> Result<i64, NormalizationError> {
    if value < 0 {
        Err(NormalizationError::NegativeCounter { field, value })
    } else {
        Ok(value)
    }
}

fn timestamp(secs: f64) -> Result<DateTime<Utc>, NormalizationError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(NormalizationError::InvalidTimestamp(secs));
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos)
        .single()
        .ok_or(NormalizationError::InvalidTimestamp(secs))
}

fn to_top_comment(raw: &RawComment) -> Option<TopComment> {
    let body = raw.body.as_deref()?.trim();
    if body.is_empty() {
        return None;
    }
    Some(TopComment {
        id: raw.id.clone(),
        author: raw.author.clone(),
        body: body.to_string(),
        score: raw.score.unwrap_or(0),
        created_at: raw.created_utc.and_then(|s| timestamp(s).ok()),
        is_submitter: raw.is_submitter,
    })
}
