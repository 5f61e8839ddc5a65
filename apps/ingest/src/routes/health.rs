use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// GET /health
/// `ok` when the post store answers, `degraded` (503) otherwise.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: store ping failed: {e}");
            false
        }
    };
    let cache = match state.cache.ping().await {
        Some(true) => "ok",
        Some(false) => "unreachable",
        None => "disabled",
    };

    let (status, label) = if store_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(json!({
            "status": label,
            "version": env!("CARGO_PKG_VERSION"),
            "service": env!("CARGO_PKG_NAME"),
            "store": if store_ok { "ok" } else { "unavailable" },
            "cache": cache
        })),
    )
}
