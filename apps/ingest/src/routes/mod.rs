pub mod health;
pub mod metrics;

use axum::{
    body::Body,
    http::{HeaderName, Request},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, TraceLayer};
use tracing::Level;

use crate::posts::handlers;
use crate::state::AppState;

/// Read from the caller when present, generated otherwise, echoed on the response.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

pub fn build_router(state: AppState) -> Router {
    let correlation_id = HeaderName::from_static(CORRELATION_ID_HEADER);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        // Ingestion
        .route("/api/v1/ingest", post(handlers::handle_batch_ingest))
        .route("/api/v1/ingest/:subreddit", post(handlers::handle_ingest))
        // Queries
        .route(
            "/api/v1/posts/:subreddit/top",
            get(handlers::handle_top_posts),
        )
        .route(
            "/api/v1/posts/:subreddit/recent",
            get(handlers::handle_recent_posts),
        )
        .route("/api/v1/posts/id/:id", get(handlers::handle_get_post))
        // Consumers
        .route(
            "/api/v1/summaries/:post_id",
            post(handlers::handle_summarize),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    correlation_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<Body>| {
                            let correlation_id = request
                                .headers()
                                .get(CORRELATION_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("-");
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                correlation_id
                            )
                        })
                        .on_request(DefaultOnRequest::new().level(Level::INFO)),
                )
                .layer(PropagateRequestIdLayer::new(correlation_id)),
        )
}
