use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::posts::ingest::{BatchIngestReport, IngestReport};
use crate::posts::models::Post;
use crate::posts::summary::PostSummary;
use crate::reddit::{ListingMode, MAX_LISTING_LIMIT};
use crate::state::AppState;

pub const DEFAULT_INGEST_LIMIT: usize = 25;
const MAX_BATCH_SUBREDDITS: usize = 20;

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    pub mode: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BatchIngestRequest {
    pub subreddits: Vec<String>,
    pub mode: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PostsParams {
    pub limit: Option<i64>,
    pub since: Option<DateTime<Utc>>,
}

fn parse_mode(raw: Option<&str>) -> Result<ListingMode, AppError> {
    match raw {
        Some(raw) => Ok(raw.parse::<ListingMode>()?),
        None => Ok(ListingMode::default()),
    }
}

/// POST /api/v1/ingest/:subreddit?mode=&limit=
pub async fn handle_ingest(
    State(state): State<AppState>,
    Path(subreddit): Path<String>,
    Query(params): Query<IngestParams>,
) -> Result<Json<IngestReport>, AppError> {
    let mode = parse_mode(params.mode.as_deref())?;
    let limit = params.limit.unwrap_or(DEFAULT_INGEST_LIMIT);
    let report = state.ingestor.run_ingest(&subreddit, mode, limit).await?;
    Ok(Json(report))
}

/// POST /api/v1/ingest
pub async fn handle_batch_ingest(
    State(state): State<AppState>,
    Json(req): Json<BatchIngestRequest>,
) -> Result<Json<BatchIngestReport>, AppError> {
    if req.subreddits.is_empty() {
        return Err(AppError::Validation("subreddits must not be empty".to_string()));
    }
    if req.subreddits.len() > MAX_BATCH_SUBREDDITS {
        return Err(AppError::Validation(format!(
            "at most {MAX_BATCH_SUBREDDITS} subreddits per batch"
        )));
    }
    let mode = parse_mode(req.mode.as_deref())?;
    let limit = req.limit.unwrap_or(DEFAULT_INGEST_LIMIT);
    if limit == 0 || limit > MAX_LISTING_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_LISTING_LIMIT}"
        )));
    }

    info!("Batch ingest of {} subreddits", req.subreddits.len());
    Ok(Json(
        state.ingestor.run_batch(&req.subreddits, mode, limit).await,
    ))
}

/// GET /api/v1/posts/:subreddit/top?limit=&since=
pub async fn handle_top_posts(
    State(state): State<AppState>,
    Path(subreddit): Path<String>,
    Query(params): Query<PostsParams>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = state
        .queries
        .top(&subreddit, params.since, params.limit)
        .await?;
    Ok(Json(posts))
}

/// GET /api/v1/posts/:subreddit/recent?limit=&since=
pub async fn handle_recent_posts(
    State(state): State<AppState>,
    Path(subreddit): Path<String>,
    Query(params): Query<PostsParams>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = state
        .queries
        .recent(&subreddit, params.since, params.limit)
        .await?;
    Ok(Json(posts))
}

/// GET /api/v1/posts/id/:id
pub async fn handle_get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Post>, AppError> {
    state
        .queries
        .by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Post {id} not found")))
}

/// POST /api/v1/summaries/:post_id
pub async fn handle_summarize(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<PostSummary>, AppError> {
    Ok(Json(state.summarizer.summarize(post_id).await?))
}
