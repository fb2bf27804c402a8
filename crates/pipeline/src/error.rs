//! Pipeline error type.

use tuneforge_core::error::CoreError;
use tuneforge_providers::ProviderError;

/// Errors surfaced by the orchestration pipeline.
///
/// Wraps the domain, storage, and provider layers without flattening
/// them: the HTTP layer needs to distinguish a provider outage (502)
/// from a validation failure (400) from a conflict (409).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A domain-level error (validation, not-found, conflict, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A provider call failed after exhausting its retry budget.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// No adapter is configured for the requested provider.
    #[error("No adapter configured for provider '{provider}'")]
    AdapterUnavailable { provider: &'static str },
}

/// Whether a sqlx error is a Postgres unique-constraint violation.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}
