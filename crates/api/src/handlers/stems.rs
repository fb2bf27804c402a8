//! Handlers for stem separation (derived single-instrument jobs).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tuneforge_core::error::CoreError;
use tuneforge_core::sanitize;
use tuneforge_core::types::{DbId, Provider};
use tuneforge_db::models::stem::CreateStem;
use tuneforge_db::repositories::{StemRepo, VersionRepo};
use tuneforge_events::{names, PlatformEvent};
use tuneforge_pipeline::PipelineError;
use tuneforge_providers::StemRequest;

use crate::error::{AppError, AppResult};
use crate::handlers::{enforce_rate_limit, find_and_authorize_track};
use crate::middleware::identity::RequestIdentity;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/tracks/{id}/stems
pub async fn list_stems(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Path(track_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    find_and_authorize_track(&state.pool, track_id, user_id, "view").await?;

    let stems = StemRepo::list_for_track(&state.pool, track_id).await?;
    Ok(Json(DataResponse { data: stems }))
}

/// POST /api/v1/tracks/{id}/stems
///
/// Request a stem separation for a track (optionally pinned to a
/// specific version). Creates the stem row, dispatches the derived job
/// to the track's provider, and returns 202 — completion arrives via
/// callback or recovery polling. Rate limited at 5/60s.
pub async fn request_stem(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Path(track_id): Path<DbId>,
    Json(input): Json<CreateStem>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    enforce_rate_limit(&state, &identity, &state.config.rate_limits.stem_separation)?;

    let track = find_and_authorize_track(&state.pool, track_id, user_id, "modify").await?;

    let stem_type = sanitize::sanitize_string(&input.stem_type, 50);
    let separation_mode = sanitize::sanitize_string(&input.separation_mode, 50);
    if stem_type.is_empty() || separation_mode.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "stem_type and separation_mode are required".to_string(),
        )));
    }

    // Resolve the source audio: the named version, else the track's
    // preferred render.
    let audio_url = match input.version_id {
        Some(version_id) => {
            let version = VersionRepo::find_by_id(&state.pool, version_id)
                .await?
                .filter(|v| v.track_id == track_id)
                .ok_or(AppError::Core(CoreError::NotFound {
                    entity: "TrackVersion",
                    id: version_id,
                }))?;
            version.audio_url
        }
        None => track.audio_url.clone(),
    };

    let Some(audio_url) = audio_url else {
        return Err(AppError::Core(CoreError::Conflict(
            "Track has no audio to separate yet".to_string(),
        )));
    };

    let provider = Provider::parse(&track.provider).map_err(AppError::Core)?;
    if !provider.is_remote() {
        return Err(AppError::Core(CoreError::Validation(
            "Manual tracks have no provider to run stem separation".to_string(),
        )));
    }
    let adapter = state
        .registry
        .get(provider)
        .ok_or(AppError::Pipeline(PipelineError::AdapterUnavailable {
            provider: provider.as_str(),
        }))?;

    let sanitized = CreateStem {
        version_id: input.version_id,
        stem_type: stem_type.clone(),
        separation_mode: separation_mode.clone(),
    };
    let stem = StemRepo::create(&state.pool, track_id, &sanitized).await?;

    let request = StemRequest {
        audio_url,
        stem_type,
        separation_mode,
    };

    match adapter.submit_stem(&request).await {
        Ok(submitted) => {
            StemRepo::mark_processing(&state.pool, stem.id, &submitted.provider_task_id)
                .await?;

            state.event_bus.publish(
                PlatformEvent::new(names::STEM_REQUESTED)
                    .with_source("stem", stem.id)
                    .with_actor(user_id)
                    .with_payload(serde_json::json!({
                        "track_id": track_id,
                        "provider_task_id": &submitted.provider_task_id,
                    })),
            );

            tracing::info!(
                track_id,
                stem_id = stem.id,
                provider_task_id = %submitted.provider_task_id,
                "Stem separation queued",
            );

            let stem = StemRepo::find_by_id(&state.pool, stem.id)
                .await?
                .unwrap_or(stem);
            Ok((StatusCode::ACCEPTED, Json(DataResponse { data: stem })))
        }
        Err(provider_error) => {
            let reason = provider_error.to_string();
            StemRepo::fail(&state.pool, stem.id, &reason).await?;

            state.event_bus.publish(
                PlatformEvent::new(names::STEM_FAILED)
                    .with_source("stem", stem.id)
                    .with_payload(serde_json::json!({ "reason": reason })),
            );

            Err(AppError::Pipeline(provider_error.into()))
        }
    }
}
