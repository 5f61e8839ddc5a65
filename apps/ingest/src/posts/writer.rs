use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::posts::models::NewPost;
use crate::posts::store::{InsertResult, PersistenceError, PostStore};

const MAX_WRITE_ATTEMPTS: u32 = 3;
const WRITE_BASE_DELAY: Duration = Duration::from_millis(100);

/// Outcome of one candidate. A duplicate url is a status, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteStatus {
    Inserted { id: i64 },
    SkippedDuplicate,
    RejectedInvalid { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub url: Option<String>,
    #[serde(flatten)]
    pub status: WriteStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub rejected_invalid: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, status: &WriteStatus) {
        match status {
            WriteStatus::Inserted { .. } => self.inserted += 1,
            WriteStatus::SkippedDuplicate => self.skipped_duplicate += 1,
            WriteStatus::RejectedInvalid { .. } => self.rejected_invalid += 1,
            WriteStatus::Failed { .. } => self.failed += 1,
        }
    }
}

/// Per-record report of a batch write, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub records: Vec<RecordOutcome>,
}

impl BatchReport {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for record in &self.records {
            counts.record(&record.status);
        }
        counts
    }
}

/// First-writer-wins persistence of canonical posts.
#[derive(Clone)]
pub struct DedupWriter {
    store: Arc<dyn PostStore>,
    max_attempts: u32,
    base_delay: Duration,
}

impl DedupWriter {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self {
            store,
            max_attempts: MAX_WRITE_ATTEMPTS,
            base_delay: WRITE_BASE_DELAY,
        }
    }

    #[cfg(test)]
    fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.base_delay = base_delay;
        self
    }

    /// Writes one candidate, retrying transient store failures.
    pub async fn write(&self, post: &NewPost) -> WriteStatus {
        if let Err(reason) = post.check_invariants() {
            warn!("Rejecting post {}: {}", post.url, reason);
            return WriteStatus::RejectedInvalid { reason };
        }

        let mut last_error: Option<PersistenceError> = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.base_delay * (1 << (attempt - 1));
                warn!(
                    "Write of {} attempt {} failed, retrying after {}ms...",
                    post.url,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.store.insert_if_absent(post).await {
                Ok(InsertResult::Inserted(id)) => {
                    debug!("Inserted post {id} ({})", post.url);
                    return WriteStatus::Inserted { id };
                }
                Ok(InsertResult::Duplicate) => {
                    debug!("Skipping duplicate url {}", post.url);
                    return WriteStatus::SkippedDuplicate;
                }
                Err(e) if !e.is_transient() => {
                    warn!("Store rejected {}: {}", post.url, e);
                    return WriteStatus::RejectedInvalid {
                        reason: e.to_string(),
                    };
                }
                Err(e) => last_error = Some(e),
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no write attempts made".to_string());
        warn!(
            "Giving up on {} after {} attempts: {}",
            post.url, self.max_attempts, reason
        );
        WriteStatus::Failed { reason }
    }

    /// Writes candidates one at a time, in order. A failure on one record
    /// never stops the batch.
    pub async fn write_batch(&self, posts: &[NewPost]) -> BatchReport {
        let mut report = BatchReport::default();
        for post in posts {
            let status = self.write(post).await;
            report.records.push(RecordOutcome {
                url: Some(post.url.clone()),
                status,
            });
        }
        report
    }
}
