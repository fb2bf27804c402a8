//! Handlers for track versions (variants).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tuneforge_core::error::CoreError;
use tuneforge_core::sanitize;
use tuneforge_core::types::DbId;
use tuneforge_db::models::version::NewTrackVersion;
use tuneforge_db::repositories::VersionRepo;
use tuneforge_events::{names, PlatformEvent};

use crate::error::{AppError, AppResult};
use crate::handlers::find_and_authorize_track;
use crate::middleware::identity::RequestIdentity;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body for `POST /tracks/{id}/versions` — attaching a render produced
/// by a derived operation (extend, cover, upscale). The version number
/// and preferred flag are assigned server-side.
#[derive(Debug, Deserialize)]
pub struct AttachVersionRequest {
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
    pub duration_secs: Option<i32>,
    pub provider_version_id: Option<String>,
    pub lyrics: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// GET /api/v1/tracks/{id}/versions
///
/// List a track's versions in number order.
pub async fn list_versions(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Path(track_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    find_and_authorize_track(&state.pool, track_id, user_id, "view").await?;

    let versions = VersionRepo::list_for_track(&state.pool, track_id).await?;
    Ok(Json(DataResponse { data: versions }))
}

/// POST /api/v1/tracks/{id}/versions
///
/// Attach a version to a track. Works on terminal tracks too: a later
/// upscale/extend may add renders to a `completed` track without
/// reopening its lifecycle.
pub async fn attach_version(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Path(track_id): Path<DbId>,
    Json(input): Json<AttachVersionRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    find_and_authorize_track(&state.pool, track_id, user_id, "modify").await?;

    let new_version = NewTrackVersion {
        audio_url: checked_url(input.audio_url, "audio_url")?,
        video_url: checked_url(input.video_url, "video_url")?,
        cover_url: checked_url(input.cover_url, "cover_url")?,
        duration_secs: input.duration_secs.map(|d| d.max(0)),
        provider_version_id: input
            .provider_version_id
            .as_deref()
            .map(|v| sanitize::sanitize_string(v, 128))
            .filter(|v| !v.is_empty()),
        lyrics: input
            .lyrics
            .as_deref()
            .map(sanitize::sanitize_lyrics)
            .filter(|l| !l.is_empty()),
        metadata: input.metadata,
    };

    let version = VersionRepo::attach(&state.pool, track_id, &new_version).await?;

    state.event_bus.publish(
        PlatformEvent::new(names::TRACK_VERSION_ADDED)
            .with_source("track", track_id)
            .with_actor(user_id)
            .with_payload(serde_json::json!({
                "version_id": version.id,
                "version_number": version.version_number,
            })),
    );

    tracing::info!(
        track_id,
        version_id = version.id,
        version_number = version.version_number,
        "Version attached",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: version })))
}

/// POST /api/v1/tracks/{id}/versions/{version_id}/preferred
///
/// Make one version the preferred (master) render. Exclusive: the
/// previous flag is cleared in the same transaction.
pub async fn set_preferred(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Path((track_id, version_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    find_and_authorize_track(&state.pool, track_id, user_id, "modify").await?;

    let version = VersionRepo::set_preferred(&state.pool, track_id, version_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "TrackVersion",
            id: version_id,
        }))?;

    state.event_bus.publish(
        PlatformEvent::new(names::TRACK_PREFERRED_CHANGED)
            .with_source("track", track_id)
            .with_actor(user_id)
            .with_payload(serde_json::json!({
                "version_id": version.id,
                "version_number": version.version_number,
            })),
    );

    tracing::info!(track_id, version_id, "Preferred version changed");

    Ok(Json(DataResponse { data: version }))
}

/// Sanitize an optional URL field, rejecting values that survive
/// sanitization as non-URLs (a silently dropped audio reference would
/// be worse than a 400).
fn checked_url(raw: Option<String>, field: &str) -> AppResult<Option<String>> {
    match raw {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => match sanitize::sanitize_url(&raw) {
            Some(url) => Ok(Some(url)),
            None => Err(AppError::Core(CoreError::Validation(format!(
                "{field} must be an http(s) URL"
            )))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_url_accepts_https_and_rejects_other_schemes() {
        assert_eq!(
            checked_url(Some("https://cdn/a.mp3".into()), "audio_url").unwrap(),
            Some("https://cdn/a.mp3".into()),
        );
        assert_eq!(checked_url(None, "audio_url").unwrap(), None);
        assert_eq!(checked_url(Some("  ".into()), "audio_url").unwrap(), None);
        assert!(checked_url(Some("javascript:x".into()), "audio_url").is_err());
    }
}
