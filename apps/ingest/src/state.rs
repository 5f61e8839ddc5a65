use std::sync::Arc;

use crate::cache::SubredditCache;
use crate::metrics::RedditMetrics;
use crate::posts::ingest::Ingestor;
use crate::posts::query::QueryService;
use crate::posts::store::PostStore;
use crate::posts::summary::Summarizer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PostStore>,
    pub queries: QueryService,
    pub ingestor: Arc<Ingestor>,
    pub summarizer: Summarizer,
    pub cache: SubredditCache,
    pub metrics: Arc<RedditMetrics>,
}
