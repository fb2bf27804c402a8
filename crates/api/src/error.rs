use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tuneforge_core::error::CoreError;
use tuneforge_pipeline::PipelineError;
use tuneforge_providers::ProviderError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`]/[`PipelineError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent `{ "error": ..., "code": ... }` JSON bodies — the `code`
/// is a stable machine string so presentation logic never
/// pattern-matches on message text.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `tuneforge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A pipeline error (wraps core/database/provider failures).
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Too many requests in the current window.
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Rate limiting carries an extra header, handled separately.
        if let AppError::RateLimited { retry_after_secs } = &self {
            let body = json!({
                "error": "Rate limit exceeded. Try again later.",
                "code": "RATE_LIMITED",
            });
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }

        let (status, code, message) = classify(&self);
        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map an error to (status, stable code, user-facing message).
fn classify(error: &AppError) -> (StatusCode, &'static str, String) {
    match error {
        AppError::Core(core) => classify_core_error(core),

        AppError::Pipeline(pipeline) => match pipeline {
            PipelineError::Core(core) => classify_core_error(core),
            PipelineError::Database(err) => classify_sqlx_error(err),
            PipelineError::Provider(err) => classify_provider_error(err),
            PipelineError::AdapterUnavailable { provider } => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_UNAVAILABLE",
                format!("Provider '{provider}' is not configured"),
            ),
        },

        AppError::Database(err) => classify_sqlx_error(err),

        AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

        // Handled before classify(); kept for exhaustiveness.
        AppError::RateLimited { .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Rate limit exceeded. Try again later.".to_string(),
        ),

        AppError::InternalError(msg) => {
            tracing::error!(error = %msg, "Internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_FAILED", msg.clone())
        }
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => {
            (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
        }
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

/// Provider failures surface as a gateway problem: the track state
/// already records the verbatim reason, the HTTP caller just needs to
/// know the upstream was at fault.
fn classify_provider_error(err: &ProviderError) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Provider error surfaced to HTTP");
    (
        StatusCode::BAD_GATEWAY,
        "PROVIDER_UNAVAILABLE",
        err.to_string(),
    )
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`)
///   map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
