//! Track entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tuneforge_core::types::{DbId, Timestamp, UserId};

use super::status::StatusId;

/// A row from the `tracks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Track {
    pub id: DbId,
    pub user_id: UserId,
    pub title: String,
    pub prompt: String,
    pub lyrics: Option<String>,
    pub style_tags: Option<Vec<String>>,
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub has_vocals: bool,
    /// Provider name: `suno`, `mureka`, or `manual`. Parsed into
    /// [`tuneforge_core::types::Provider`] only at the adapter-selection
    /// boundary.
    pub provider: String,
    pub status_id: StatusId,
    pub model_version: Option<String>,
    pub error_message: Option<String>,
    pub duration_secs: Option<i32>,
    /// Denormalized pointers to the preferred version's media, kept in
    /// sync by the version repository.
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields for inserting a new track row.
#[derive(Debug, Clone)]
pub struct CreateTrack {
    pub user_id: UserId,
    pub title: String,
    pub prompt: String,
    pub lyrics: Option<String>,
    pub style_tags: Option<Vec<String>>,
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub has_vocals: bool,
    pub provider: String,
    pub model_version: Option<String>,
    pub metadata: serde_json::Value,
}

/// Query parameters for listing a user's tracks.
#[derive(Debug, Default, Deserialize)]
pub struct TrackListQuery {
    /// Filter by status ID (e.g. 3 = processing).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

// ---------------------------------------------------------------------------
// Metadata bag
// ---------------------------------------------------------------------------

/// Typed view over the track's open `metadata` JSONB bag.
///
/// The orchestration code depends on these fields; anything else a
/// provider writes is preserved untouched in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_task_id: Option<String>,
    /// Provider-reported stage description (e.g. "streaming",
    /// "awaiting_lyrics_selection").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_attempts: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_callback_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Timestamp>,
    /// Set when a state change came from recovery polling rather than
    /// a webhook (e.g. "stuck-sync").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_via: Option<String>,
    /// Provider-specific extras, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrackMetadata {
    /// Parse the bag, tolerating unknown or malformed content: a
    /// non-object value yields the default (empty) view.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Serialize back into the JSONB representation.
    pub fn into_value(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}
