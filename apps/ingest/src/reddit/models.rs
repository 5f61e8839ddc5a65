use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{"kind": "Listing", "data": {...}}` envelope returned by listing endpoints.
#[derive(Debug, Deserialize)]
pub struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
pub struct ListingData<T> {
    pub after: Option<String>,
    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

/// A listing item exactly as Reddit sent it. Every field is optional;
/// validation happens in the normalizer, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawPost {
    pub id: Option<String>,
    pub subreddit: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub num_comments: Option<i64>,
    pub created_utc: Option<f64>,
    pub selftext: Option<String>,
    pub permalink: Option<String>,
    /// Reddit sends `null` here for some promoted and quarantined items.
    pub over_18: Option<bool>,
}

impl RawPost {
    /// Keeps the identifying string fields of an item that failed to decode,
    /// so the rejection can still be reported against its id and url.
    pub fn salvage(value: &serde_json::Value) -> Self {
        let text = |key: &str| value.get(key).and_then(|v| v.as_str()).map(String::from);
        Self {
            id: text("id"),
            subreddit: text("subreddit"),
            url: text("url"),
            permalink: text("permalink"),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawComment {
    pub id: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
    pub score: Option<i64>,
    pub created_utc: Option<f64>,
    #[serde(default)]
    pub is_submitter: bool,
}

/// One listing item plus its top comments, stamped with the time it was retrieved.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPost {
    /// The subreddit the listing was requested for.
    pub collection: String,
    pub raw: RawPost,
    pub top_comments: Vec<RawComment>,
    pub fetched_at: DateTime<Utc>,
    /// Set when the item's JSON did not match `RawPost`; `raw` then only
    /// holds the salvaged identifying fields.
    pub decode_error: Option<String>,
}

/// Subset of `/r/{name}/about` used for the existence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubredditInfo {
    pub display_name: String,
    #[serde(default)]
    pub subscribers: i64,
    #[serde(default)]
    pub over18: bool,
    #[serde(default)]
    pub subreddit_type: Option<String>,
}
