use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use shanty_core::error::CoreError;
use shanty_player::{PlayerError, ResolveError, StoreError};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`PlayerError`] for scheduler
/// failures. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Player(#[from] PlayerError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Player(player) => classify_player_error(player),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
    }
}

/// Map scheduler errors onto the request/operational split: resolution
/// failures are the caller's problem, store failures are ours.
fn classify_player_error(err: &PlayerError) -> Classified {
    match err {
        PlayerError::Invalid(core) => classify_core_error(core),
        PlayerError::Resolve(resolve) => match resolve {
            ResolveError::NotFound(reference) => (
                StatusCode::NOT_FOUND,
                "TRACK_NOT_FOUND",
                format!("No playable result for {reference}"),
            ),
            ResolveError::Cancelled => (
                StatusCode::CONFLICT,
                "CANCELLED",
                "Request was cancelled by a queue clear".to_string(),
            ),
            other => {
                tracing::warn!(error = %other, "Track resolution failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "RESOLVE_FAILED",
                    "Could not look up the track".to_string(),
                )
            }
        },
        PlayerError::Store(StoreError::Database(db)) => classify_sqlx_error(db),
        PlayerError::Store(StoreError::Unavailable(msg)) => {
            tracing::error!(error = %msg, "Queue store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "The queue is temporarily unavailable".to_string(),
            )
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Pool exhaustion and I/O failures map to 503.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> Classified {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            tracing::error!(error = %err, "Database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "The queue is temporarily unavailable".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
