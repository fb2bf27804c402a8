//! Track version (variant) models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tuneforge_core::types::{DbId, Timestamp};

/// A row from the `track_versions` table: one concrete render
/// belonging to a track.
///
/// Version numbers are unique within a track and assigned in creation
/// order; number 0 is the canonical render when a provider returns
/// several simultaneous renders. At most one version per track carries
/// `is_preferred = true` (enforced by a partial unique index).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrackVersion {
    pub id: DbId,
    pub track_id: DbId,
    pub version_number: i32,
    pub is_preferred: bool,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
    pub duration_secs: Option<i32>,
    /// The provider's own id for this render (e.g. a Suno clip id).
    pub provider_version_id: Option<String>,
    pub lyrics: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

/// Fields for attaching a new version. The version number and the
/// preferred flag are assigned by the repository, never by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrackVersion {
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
    pub duration_secs: Option<i32>,
    pub provider_version_id: Option<String>,
    pub lyrics: Option<String>,
    /// Defaults to an empty object, never JSON null — the column is
    /// NOT NULL.
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl Default for NewTrackVersion {
    fn default() -> Self {
        Self {
            audio_url: None,
            video_url: None,
            cover_url: None,
            duration_secs: None,
            provider_version_id: None,
            lyrics: None,
            metadata: empty_metadata(),
        }
    }
}
