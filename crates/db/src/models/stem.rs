//! Stem (single-instrument extraction) models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tuneforge_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `track_stems` table: a derived single-instrument or
/// vocal extraction tied to a version (or the bare track when no
/// version context exists). Deleted by cascade with the parent track.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrackStem {
    pub id: DbId,
    pub track_id: DbId,
    pub version_id: Option<DbId>,
    /// e.g. "vocals", "drums", "bass".
    pub stem_type: String,
    /// Provider separation mode (e.g. "split_stem", "separate_vocal").
    pub separation_mode: String,
    pub audio_url: Option<String>,
    pub provider_task_id: Option<String>,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for requesting a stem separation.
#[derive(Debug, Deserialize)]
pub struct CreateStem {
    pub version_id: Option<DbId>,
    pub stem_type: String,
    pub separation_mode: String,
}
