use crate::types::DbId;

/// Domain-level error type shared across the workspace.
///
/// Validation, conflict, and internal variants carry a human-readable
/// message; the HTTP layer maps each variant to a status code and a
/// stable machine code so presentation logic never pattern-matches on
/// message text.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
