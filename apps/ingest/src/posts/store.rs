//! Persistence for canonical posts.
//!
//! The unique index on `reddit_posts.url` is the only arbiter between
//! concurrent writers; no in-process locking sits in front of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::posts::models::{NewPost, Post};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The database refused the row itself (constraint or data exception).
    /// Retrying the same row cannot succeed.
    #[error("row rejected by the database: {0}")]
    Rejected(String),
}

impl PersistenceError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, PersistenceError::Rejected(_))
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                PersistenceError::Unavailable(e.to_string())
            }
            sqlx::Error::Database(db) => {
                // SQLSTATE class 22 is a data exception, 23 an integrity violation.
                let rejected = db
                    .code()
                    .map_or(false, |code| code.starts_with("22") || code.starts_with("23"));
                if rejected {
                    PersistenceError::Rejected(db.to_string())
                } else {
                    PersistenceError::Database(sqlx::Error::Database(db))
                }
            }
            other => PersistenceError::Database(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Inserted(i64),
    /// A row with the same url already exists; nothing was written.
    Duplicate,
}

/// Filter shared by both read shapes.
#[derive(Debug, Clone)]
pub struct PostQuery {
    pub subreddit: String,
    /// Only posts created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Writes the post unless its url is already stored. One atomic commit per call.
    async fn insert_if_absent(&self, post: &NewPost) -> Result<InsertResult, PersistenceError>;

    /// Ordered by `normalized_score DESC, created_at DESC, id ASC`.
    async fn top_by_score(&self, query: &PostQuery) -> Result<Vec<Post>, PersistenceError>;

    /// Ordered by `created_at DESC, normalized_score DESC, id ASC`.
    async fn most_recent(&self, query: &PostQuery) -> Result<Vec<Post>, PersistenceError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Post>, PersistenceError>;

    async fn ping(&self) -> Result<(), PersistenceError>;
}

pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn insert_if_absent(&self, post: &NewPost) -> Result<InsertResult, PersistenceError> {
        // Single statement: the row and its JSONB payload commit together or not at all.
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO reddit_posts
                (source, subreddit, title, url, author, score, comments,
                 normalized_score, created_at, fetched_at, top_comments, post_text)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&post.source)
        .bind(&post.subreddit)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.author)
        .bind(post.score)
        .bind(post.comments)
        .bind(post.normalized_score)
        .bind(post.created_at)
        .bind(post.fetched_at)
        .bind(&post.top_comments)
        .bind(&post.post_text)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match id {
            Some(id) => InsertResult::Inserted(id),
            None => InsertResult::Duplicate,
        })
    }

    async fn top_by_score(&self, query: &PostQuery) -> Result<Vec<Post>, PersistenceError> {
        Ok(sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM reddit_posts
            WHERE subreddit = $1
              AND created_at >= COALESCE($2, '-infinity'::timestamptz)
            ORDER BY normalized_score DESC, created_at DESC, id ASC
            LIMIT $3
            "#,
        )
        .bind(&query.subreddit)
        .bind(query.since)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn most_recent(&self, query: &PostQuery) -> Result<Vec<Post>, PersistenceError> {
        Ok(sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM reddit_posts
            WHERE subreddit = $1
              AND created_at >= COALESCE($2, '-infinity'::timestamptz)
            ORDER BY created_at DESC, normalized_score DESC, id ASC
            LIMIT $3
            "#,
        )
        .bind(&query.subreddit)
        .bind(query.since)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Post>, PersistenceError> {
        Ok(
            sqlx::query_as::<_, Post>("SELECT * FROM reddit_posts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-process `PostStore` with the same uniqueness and ordering rules as
    //! the Postgres schema.

    use std::cmp::Ordering;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub(crate) struct MemoryPostStore {
        rows: Mutex<Vec<Post>>,
        fail_next_inserts: AtomicU32,
        reject_next_inserts: AtomicU32,
        insert_attempts: AtomicU32,
        offline: AtomicBool,
    }

    impl MemoryPostStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// The next `n` inserts fail with `Unavailable`.
        pub(crate) fn fail_next_inserts(&self, n: u32) {
            self.fail_next_inserts.store(n, AtomicOrdering::SeqCst);
        }

        /// The next `n` inserts fail with `Rejected`, as a CHECK violation would.
        pub(crate) fn reject_next_inserts(&self, n: u32) {
            self.reject_next_inserts.store(n, AtomicOrdering::SeqCst);
        }

        pub(crate) fn insert_attempts(&self) -> u32 {
            self.insert_attempts.load(AtomicOrdering::SeqCst)
        }

        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, AtomicOrdering::SeqCst);
        }

        pub(crate) fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub(crate) fn urls(&self) -> Vec<String> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.url.clone())
                .collect()
        }

        fn check_online(&self) -> Result<(), PersistenceError> {
            if self.offline.load(AtomicOrdering::SeqCst) {
                Err(PersistenceError::Unavailable("store is offline".to_string()))
            } else {
                Ok(())
            }
        }

        fn select(
            &self,
            query: &PostQuery,
            order: fn(&Post, &Post) -> Ordering,
        ) -> Result<Vec<Post>, PersistenceError> {
            self.check_online()?;
            let mut rows: Vec<Post> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.subreddit == query.subreddit)
                .filter(|p| query.since.map_or(true, |since| p.created_at >= since))
                .cloned()
                .collect();
            rows.sort_by(order);
            rows.truncate(usize::try_from(query.limit).unwrap_or(0));
            Ok(rows)
        }
    }

    pub(crate) fn top_order(a: &Post, b: &Post) -> Ordering {
        b.normalized_score
            .total_cmp(&a.normalized_score)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    pub(crate) fn recent_order(a: &Post, b: &Post) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.normalized_score.total_cmp(&a.normalized_score))
            .then_with(|| a.id.cmp(&b.id))
    }

    #[async_trait]
    impl PostStore for MemoryPostStore {
        async fn insert_if_absent(
            &self,
            post: &NewPost,
        ) -> Result<InsertResult, PersistenceError> {
            self.insert_attempts.fetch_add(1, AtomicOrdering::SeqCst);
            self.check_online()?;
            let rejects = self.reject_next_inserts.load(AtomicOrdering::SeqCst);
            if rejects > 0 {
                self.reject_next_inserts
                    .store(rejects - 1, AtomicOrdering::SeqCst);
                return Err(PersistenceError::Rejected(
                    "new row violates check constraint".to_string(),
                ));
            }
            let pending = self.fail_next_inserts.load(AtomicOrdering::SeqCst);
            if pending > 0 {
                self.fail_next_inserts
                    .store(pending - 1, AtomicOrdering::SeqCst);
                return Err(PersistenceError::Unavailable(
                    "injected failure".to_string(),
                ));
            }

            // Check and insert under one lock, like the unique index.
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|p| p.url == post.url) {
                return Ok(InsertResult::Duplicate);
            }
            let id = rows.len() as i64 + 1;
            rows.push(post.clone().into_post(id));
            Ok(InsertResult::Inserted(id))
        }

        async fn top_by_score(&self, query: &PostQuery) -> Result<Vec<Post>, PersistenceError> {
            self.select(query, top_order)
        }

        async fn most_recent(&self, query: &PostQuery) -> Result<Vec<Post>, PersistenceError> {
            self.select(query, recent_order)
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<Post>, PersistenceError> {
            self.check_online()?;
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .cloned())
        }

        async fn ping(&self) -> Result<(), PersistenceError> {
            self.check_online()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures_are_unavailable() {
        assert!(matches!(
            PersistenceError::from(sqlx::Error::PoolTimedOut),
            PersistenceError::Unavailable(_)
        ));
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            PersistenceError::from(sqlx::Error::Io(io)),
            PersistenceError::Unavailable(_)
        ));
    }

    #[test]
    fn test_only_rejections_are_permanent() {
        assert!(PersistenceError::from(sqlx::Error::PoolClosed).is_transient());
        assert!(PersistenceError::from(sqlx::Error::Protocol("bad frame".into())).is_transient());
        assert!(!PersistenceError::Rejected("check".into()).is_transient());
    }
}
