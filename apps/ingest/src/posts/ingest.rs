//! One ingestion run: fetch → normalize → filter → write, record by record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{pin_mut, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::SubredditCache;
use crate::metrics::RedditMetrics;
use crate::posts::filter::{FilterReason, PostFilter};
use crate::posts::normalize::normalize;
use crate::posts::scoring::ScoringPolicy;
use crate::posts::writer::{DedupWriter, RecordOutcome, WriteStatus};
use crate::reddit::{
    validate_subreddit, FetchError, ListingMode, RedditClient, MAX_LISTING_LIMIT,
};

#[derive(Debug, Clone, Serialize)]
pub struct FilteredRecord {
    pub url: String,
    pub reason: FilterReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub subreddit: String,
    pub mode: ListingMode,
    pub started_at: DateTime<Utc>,
    pub fetched: usize,
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub rejected_invalid: usize,
    pub filtered: usize,
    pub failed: usize,
    /// Writer outcomes and normalization rejects, in listing order.
    pub records: Vec<RecordOutcome>,
    pub filtered_records: Vec<FilteredRecord>,
}

impl IngestReport {
    fn new(run_id: Uuid, subreddit: &str, mode: ListingMode) -> Self {
        Self {
            run_id,
            subreddit: subreddit.to_string(),
            mode,
            started_at: Utc::now(),
            fetched: 0,
            inserted: 0,
            skipped_duplicate: 0,
            rejected_invalid: 0,
            filtered: 0,
            failed: 0,
            records: Vec::new(),
            filtered_records: Vec::new(),
        }
    }

    fn push(&mut self, outcome: RecordOutcome) {
        match outcome.status {
            WriteStatus::Inserted { .. } => self.inserted += 1,
            WriteStatus::SkippedDuplicate => self.skipped_duplicate += 1,
            WriteStatus::RejectedInvalid { .. } => self.rejected_invalid += 1,
            WriteStatus::Failed { .. } => self.failed += 1,
        }
        self.records.push(outcome);
    }

    fn push_filtered(&mut self, url: String, reason: FilterReason) {
        self.filtered += 1;
        self.filtered_records.push(FilteredRecord { url, reason });
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("subreddit r/{0} does not exist or is not accessible")]
    UnknownSubreddit(String),

    /// The run stopped early. `report` holds everything processed before the failure.
    #[error("ingest of r/{} aborted after {} records: {source}", .report.subreddit, .report.fetched)]
    Fetch {
        source: FetchError,
        report: Box<IngestReport>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub subreddit: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchIngestReport {
    /// Completed and partial runs, in request order.
    pub runs: Vec<IngestReport>,
    pub failures: Vec<BatchFailure>,
}

pub struct Ingestor {
    client: Arc<RedditClient>,
    writer: DedupWriter,
    filter: PostFilter,
    policy: ScoringPolicy,
    cache: SubredditCache,
}

impl Ingestor {
    pub fn new(
        client: Arc<RedditClient>,
        writer: DedupWriter,
        filter: PostFilter,
        policy: ScoringPolicy,
        cache: SubredditCache,
    ) -> Self {
        Self {
            client,
            writer,
            filter,
            policy,
            cache,
        }
    }

    pub fn metrics(&self) -> Arc<RedditMetrics> {
        self.client.metrics()
    }

    pub async fn run_ingest(
        &self,
        subreddit: &str,
        mode: ListingMode,
        limit: usize,
    ) -> Result<IngestReport, IngestError> {
        validate_subreddit(subreddit).map_err(|e| IngestError::InvalidRequest(e.to_string()))?;
        if limit == 0 || limit > MAX_LISTING_LIMIT {
            return Err(IngestError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_LISTING_LIMIT}, got {limit}"
            )));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("ingest", %run_id, subreddit, %mode);
        self.run(run_id, subreddit, mode, limit).instrument(span).await
    }

    async fn run(
        &self,
        run_id: Uuid,
        subreddit: &str,
        mode: ListingMode,
        limit: usize,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::new(run_id, subreddit, mode);

        if let Err(e) = self.ensure_subreddit(subreddit).await {
            return Err(match e {
                FetchError::NotFound(_) => IngestError::UnknownSubreddit(subreddit.to_string()),
                source => IngestError::Fetch {
                    source,
                    report: Box::new(report),
                },
            });
        }

        info!("Starting ingest of up to {limit} posts");
        let stream = self.client.listing(subreddit, mode, limit);
        pin_mut!(stream);

        while let Some(item) = stream.next().await {
            let fetched = match item {
                Ok(fetched) => fetched,
                Err(source) => {
                    warn!(
                        "Aborting ingest after {} records: {}",
                        report.fetched, source
                    );
                    return Err(IngestError::Fetch {
                        source,
                        report: Box::new(report),
                    });
                }
            };
            report.fetched += 1;

            let post = match normalize(&fetched, &self.policy) {
                Ok(post) => post,
                Err(e) => {
                    warn!(
                        "Dropping post {}: {}",
                        fetched.raw.id.as_deref().unwrap_or("<no id>"),
                        e
                    );
                    report.push(RecordOutcome {
                        url: fetched.raw.url.clone(),
                        status: WriteStatus::RejectedInvalid {
                            reason: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            if let Some(reason) = self.filter.check(&post) {
                report.push_filtered(post.url, reason);
                continue;
            }

            let status = self.writer.write(&post).await;
            report.push(RecordOutcome {
                url: Some(post.url),
                status,
            });
        }

        info!(
            "Ingest finished: fetched={} inserted={} skipped_duplicate={} rejected_invalid={} filtered={} failed={}",
            report.fetched,
            report.inserted,
            report.skipped_duplicate,
            report.rejected_invalid,
            report.filtered,
            report.failed
        );
        Ok(report)
    }

    /// Confirms the subreddit exists, consulting the cache first.
    async fn ensure_subreddit(&self, subreddit: &str) -> Result<(), FetchError> {
        if self.cache.get(subreddit).await.is_some() {
            return Ok(());
        }
        let info = self.client.subreddit_info(subreddit).await?;
        debug!(
            "r/{} has {} subscribers",
            info.display_name, info.subscribers
        );
        self.cache.put(subreddit, &info).await;
        Ok(())
    }

    /// Ingests each subreddit in turn. A failed subreddit is recorded and
    /// the batch moves on.
    pub async fn run_batch(
        &self,
        subreddits: &[String],
        mode: ListingMode,
        limit: usize,
    ) -> BatchIngestReport {
        let mut batch = BatchIngestReport::default();
        for subreddit in subreddits {
            match self.run_ingest(subreddit, mode, limit).await {
                Ok(report) => batch.runs.push(report),
                Err(e) => {
                    warn!("Ingest of r/{subreddit} failed: {e}");
                    batch.failures.push(BatchFailure {
                        subreddit: subreddit.clone(),
                        error: e.to_string(),
                    });
                    if let IngestError::Fetch { report, .. } = e {
                        batch.runs.push(*report);
                    }
                }
            }
        }
        info!(
            "Batch finished: {} runs, {} failures",
            batch.runs.len(),
            batch.failures.len()
        );
        batch
    }
}
