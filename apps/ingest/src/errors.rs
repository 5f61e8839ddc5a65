use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::posts::ingest::{IngestError, IngestReport};
use crate::posts::query::QueryError;
use crate::posts::summary::SummaryError;
use crate::reddit::FetchError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    /// An ingest run stopped part way; the body carries what was processed.
    #[error("{cause}")]
    IngestAborted {
        cause: Box<AppError>,
        report: Box<IngestReport>,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Reddit rate limit reached, retry after {retry_after_secs}s"),
            ),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "The Reddit API request failed".to_string(),
                )
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "The post store is unavailable".to_string(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::IngestAborted { cause, .. } => cause.parts(),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            AppError::IngestAborted { cause, .. } => cause.retry_after(),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let AppError::IngestAborted { report, .. } = &self {
            error["partial_report"] = serde_json::to_value(report.as_ref()).unwrap_or(Value::Null);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(secs) = self.retry_after() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::RateLimitExceeded { retry_after } => AppError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            },
            FetchError::InvalidRequest(msg) => AppError::Validation(msg),
            FetchError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidRequest(msg) => AppError::Validation(msg),
            QueryError::StoreUnavailable(e) => AppError::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::InvalidRequest(msg) => AppError::Validation(msg),
            IngestError::UnknownSubreddit(name) => {
                AppError::NotFound(format!("Subreddit r/{name} not found"))
            }
            IngestError::Fetch { source, report } => AppError::IngestAborted {
                cause: Box::new(source.into()),
                report,
            },
        }
    }
}

impl From<SummaryError> for AppError {
    fn from(e: SummaryError) -> Self {
        match e {
            SummaryError::NotFound(id) => AppError::NotFound(format!("Post {id} not found")),
            SummaryError::Query(e) => e.into(),
            SummaryError::Llm(e) => e.into(),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        AppError::Llm(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::store::PersistenceError;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                QueryError::StoreUnavailable(PersistenceError::Unavailable("down".into())).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FetchError::RateLimitExceeded {
                    retry_after: Duration::from_secs(30),
                }
                .into(),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                FetchError::Api {
                    status: 500,
                    message: "boom".into(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (LlmError::EmptyContent.into(), StatusCode::BAD_GATEWAY),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_rate_limit_sets_retry_after_header() {
        let response = AppError::RateLimited {
            retry_after_secs: 12,
        }
        .into_response();
        assert_eq!(response.headers()[RETRY_AFTER], "12");
    }
}
