//! Read side over stored posts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::posts::models::Post;
use crate::posts::store::{PersistenceError, PostQuery, PostStore};
use crate::reddit::validate_subreddit;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] PersistenceError),
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn PostStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self { store }
    }

    /// Highest `normalized_score` first; ties by newer `created_at`, then lower id.
    /// An empty result is a valid answer.
    pub async fn top(
        &self,
        subreddit: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<Post>, QueryError> {
        let query = build_query(subreddit, since, limit)?;
        let posts = self.store.top_by_score(&query).await?;
        debug!("top r/{} returned {} posts", query.subreddit, posts.len());
        Ok(posts)
    }

    /// Newest `created_at` first, same tie-breaks as `top`.
    pub async fn recent(
        &self,
        subreddit: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<Post>, QueryError> {
        let query = build_query(subreddit, since, limit)?;
        let posts = self.store.most_recent(&query).await?;
        debug!("recent r/{} returned {} posts", query.subreddit, posts.len());
        Ok(posts)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<Post>, QueryError> {
        Ok(self.store.find_by_id(id).await?)
    }
}

fn build_query(
    subreddit: &str,
    since: Option<DateTime<Utc>>,
    limit: Option<i64>,
) -> Result<PostQuery, QueryError> {
    validate_subreddit(subreddit).map_err(|e| QueryError::InvalidRequest(e.to_string()))?;

    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(QueryError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }

    // Stored names are lowercased at normalize time.
    Ok(PostQuery {
        subreddit: subreddit.to_ascii_lowercase(),
        since,
        limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::models::tests::sample_post;
    use crate::posts::store::memory::MemoryPostStore;
    use chrono::{Duration, TimeZone};

    fn service(store: Arc<MemoryPostStore>) -> QueryService {
        QueryService::new(store)
    }

    async fn seed(store: &MemoryPostStore, rows: &[(&str, f64, i64)]) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (url, normalized, hour) in rows {
            let mut post = sample_post(url);
            post.normalized_score = *normalized;
            post.created_at = base + Duration::hours(*hour);
            post.fetched_at = base + Duration::hours(48);
            store.insert_if_absent(&post).await.unwrap();
        }
    }

    fn urls(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.url.as_str()).collect()
    }

    #[tokio::test]
    async fn test_top_orders_by_score_then_recency_then_id() {
        let store = Arc::new(MemoryPostStore::new());
        seed(
            &store,
            &[
                ("https://e.com/low", 1.0, 5),
                ("https://e.com/tie-old", 3.0, 1),
                ("https://e.com/tie-new", 3.0, 2),
                ("https://e.com/tie-new-2", 3.0, 2),
                ("https://e.com/high", 9.0, 0),
            ],
        )
        .await;

        let posts = service(store).top("rust", None, None).await.unwrap();
        assert_eq!(
            urls(&posts),
            vec![
                "https://e.com/high",
                "https://e.com/tie-new",
                "https://e.com/tie-new-2",
                "https://e.com/tie-old",
                "https://e.com/low",
            ]
        );
    }

    #[tokio::test]
    async fn test_recent_orders_by_created_at() {
        let store = Arc::new(MemoryPostStore::new());
        seed(
            &store,
            &[
                ("https://e.com/a", 9.0, 1),
                ("https://e.com/b", 1.0, 3),
                ("https://e.com/c", 5.0, 2),
            ],
        )
        .await;

        let posts = service(store).recent("rust", None, Some(2)).await.unwrap();
        assert_eq!(urls(&posts), vec!["https://e.com/b", "https://e.com/c"]);
    }

    #[tokio::test]
    async fn test_since_excludes_older_posts() {
        let store = Arc::new(MemoryPostStore::new());
        seed(
            &store,
            &[("https://e.com/old", 9.0, 1), ("https://e.com/new", 1.0, 10)],
        )
        .await;

        let since = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let posts = service(store).top("rust", Some(since), None).await.unwrap();
        assert_eq!(urls(&posts), vec!["https://e.com/new"]);
    }

    #[tokio::test]
    async fn test_subreddit_match_ignores_case() {
        let store = Arc::new(MemoryPostStore::new());
        seed(&store, &[("https://e.com/a", 2.0, 1)]).await;

        let svc = service(store);
        for name in ["rust", "Rust", "RUST"] {
            let posts = svc.top(name, None, None).await.unwrap();
            assert_eq!(urls(&posts), vec!["https://e.com/a"], "{name}");
        }
    }

    #[tokio::test]
    async fn test_empty_result_is_ok() {
        let store = Arc::new(MemoryPostStore::new());
        let posts = service(store).top("golang", None, None).await.unwrap();
        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_limit_out_of_range_is_rejected() {
        let svc = service(Arc::new(MemoryPostStore::new()));
        for limit in [0, -1, MAX_LIMIT + 1] {
            assert!(matches!(
                svc.top("rust", None, Some(limit)).await,
                Err(QueryError::InvalidRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_bad_subreddit_is_rejected() {
        let svc = service(Arc::new(MemoryPostStore::new()));
        assert!(matches!(
            svc.recent("no spaces", None, None).await,
            Err(QueryError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_store_surfaces_as_unavailable() {
        let store = Arc::new(MemoryPostStore::new());
        store.set_offline(true);
        assert!(matches!(
            service(store).top("rust", None, None).await,
            Err(QueryError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_top_order_holds_over_generated_rows() {
        let store = Arc::new(MemoryPostStore::new());
        // Small LCG so the dataset is fixed without a rand dependency.
        let mut state: u64 = 0x2545_f491;
        let mut next = move || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            state >> 33
        };
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..200 {
            let mut post = sample_post(&format!("https://e.com/{i}"));
            post.normalized_score = (next() % 8) as f64;
            post.created_at = base + Duration::minutes((next() % 30) as i64);
            post.fetched_at = base + Duration::hours(1);
            store.insert_if_absent(&post).await.unwrap();
        }

        let svc = service(store);
        let top = svc.top("rust", None, Some(MAX_LIMIT)).await.unwrap();
        assert_eq!(top.len(), MAX_LIMIT as usize);
        for pair in top.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let ordered = a.normalized_score > b.normalized_score
                || (a.normalized_score == b.normalized_score
                    && (a.created_at > b.created_at
                        || (a.created_at == b.created_at && a.id < b.id)));
            assert!(ordered, "{a:?} before {b:?}");
        }

        let recent = svc.recent("rust", None, Some(MAX_LIMIT)).await.unwrap();
        for pair in recent.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }
}
