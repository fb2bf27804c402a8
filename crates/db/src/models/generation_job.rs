//! Generation-job ledger models.

use serde::Serialize;
use sqlx::FromRow;
use tuneforge_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `generation_jobs` table: the record of one
/// outstanding request to a provider for a track.
///
/// At most one *active* job may exist per (track, provider) — enforced
/// by a partial unique index — so a client retry reuses the in-flight
/// job instead of duplicating it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationJob {
    pub id: DbId,
    pub track_id: DbId,
    pub provider: String,
    /// SHA-256 fingerprint of `"{track_id}:{caller nonce}"`.
    pub idempotency_key: String,
    pub provider_task_id: Option<String>,
    pub status_id: StatusId,
    pub polling_attempts: i32,
    pub last_error: Option<String>,
    pub submitted_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
