//! Handlers for the `/tracks` resource: drafts, listing, generation
//! submission, manual cancel, and on-demand recovery.
//!
//! Free-text fields pass through the sanitizer before anything else
//! touches them; generation and stem endpoints are rate limited per
//! operation class.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tuneforge_core::error::CoreError;
use tuneforge_core::sanitize;
use tuneforge_core::types::{DbId, Provider};
use tuneforge_db::models::status::TrackStatus;
use tuneforge_db::models::track::{Track, TrackListQuery};
use tuneforge_db::repositories::TrackRepo;
use tuneforge_pipeline::{CancelOutcome, GenerationInput, StuckLevel};

use crate::error::{AppError, AppResult};
use crate::handlers::{enforce_rate_limit, find_and_authorize_track};
use crate::middleware::identity::RequestIdentity;
use crate::response::DataResponse;
use crate::state::AppState;

/// Title recorded when the caller does not supply one.
const DEFAULT_TITLE: &str = "Untitled Track";

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Body for `POST /tracks` (manual draft creation).
#[derive(Debug, Deserialize)]
pub struct CreateTrackRequest {
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub lyrics: Option<String>,
    pub style_tags: Option<Vec<String>>,
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub has_vocals: Option<bool>,
    pub model_version: Option<String>,
}

/// Body for `POST /tracks/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Existing draft to promote; omitted for a fresh track.
    pub track_id: Option<DbId>,
    /// `suno` or `mureka`.
    pub provider: String,
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub lyrics: Option<String>,
    pub style_tags: Option<Vec<String>>,
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub has_vocals: Option<bool>,
    pub model_version: Option<String>,
    /// Caller-supplied idempotency nonce; retries with the same value
    /// reuse the in-flight job.
    pub idempotency_key: Option<String>,
}

/// `GET /tracks/{id}` response: the row plus the stuck-age hint the UI
/// uses to decide between spinner, "check status", and "cancel".
#[derive(Debug, Serialize)]
pub struct TrackDetail {
    #[serde(flatten)]
    pub track: Track,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stuck_level: Option<StuckLevel>,
}

// ---------------------------------------------------------------------------
// Draft creation & listing
// ---------------------------------------------------------------------------

/// POST /api/v1/tracks
///
/// Create a manual draft. No provider call happens; the draft can be
/// promoted later via `POST /tracks/generate`.
pub async fn create_track(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Json(input): Json<CreateTrackRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    enforce_rate_limit(&state, &identity, &state.config.rate_limits.general_api)?;

    let generation_input = sanitize_track_fields(
        user_id,
        None,
        Provider::Manual,
        input.title,
        input.prompt,
        input.lyrics,
        input.style_tags,
        input.genre,
        input.mood,
        input.has_vocals,
        input.model_version,
    );

    let track = state.orchestrator.create_draft(&generation_input).await?;

    tracing::info!(track_id = track.id, user_id = %user_id, "Draft created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: track })))
}

/// GET /api/v1/tracks
///
/// List the caller's tracks. Supports optional `status_id`, `limit`,
/// and `offset` query parameters.
pub async fn list_tracks(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Query(params): Query<TrackListQuery>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    let tracks = TrackRepo::list_by_user(&state.pool, user_id, &params).await?;
    Ok(Json(DataResponse { data: tracks }))
}

/// GET /api/v1/tracks/{id}
///
/// Fetch one track, annotated with its stuck level when it has been
/// `processing` long enough to warrant a UI affordance.
pub async fn get_track(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Path(track_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    let track = find_and_authorize_track(&state.pool, track_id, user_id, "view").await?;

    let stuck_level = if track.status_id == TrackStatus::Processing.id() {
        StuckLevel::for_age(chrono::Utc::now() - track.created_at)
    } else {
        None
    };

    Ok(Json(DataResponse {
        data: TrackDetail { track, stuck_level },
    }))
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// POST /api/v1/tracks/generate
///
/// Submit a generation request. Returns 202: the result arrives later
/// via webhook (or recovery polling). Rate limited per user.
pub async fn generate(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Json(input): Json<GenerateRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    enforce_rate_limit(
        &state,
        &identity,
        &state.config.rate_limits.music_generation,
    )?;

    let provider = Provider::parse(&input.provider).map_err(AppError::Core)?;

    let nonce = input
        .idempotency_key
        .as_deref()
        .map(|raw| sanitize::sanitize_string(raw, 128))
        .filter(|k| !k.is_empty());

    let generation_input = sanitize_track_fields(
        user_id,
        input.track_id,
        provider,
        input.title,
        input.prompt,
        input.lyrics,
        input.style_tags,
        input.genre,
        input.mood,
        input.has_vocals,
        input.model_version,
    );

    let receipt = state
        .orchestrator
        .submit_generation(generation_input, nonce)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: receipt })))
}

// ---------------------------------------------------------------------------
// Cancel / recover
// ---------------------------------------------------------------------------

/// POST /api/v1/tracks/{id}/cancel
///
/// User-initiated cancellation: authoritative locally, advisory to the
/// provider. Idempotent — cancelling an already-cancelled track
/// succeeds with `already_cancelled`.
pub async fn cancel_track(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Path(track_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    find_and_authorize_track(&state.pool, track_id, user_id, "cancel").await?;

    let outcome = state.detector.cancel_track(track_id).await?;

    if let CancelOutcome::NotCancellable { status } = &outcome {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Track is {status} and cannot be cancelled"
        ))));
    }

    tracing::info!(track_id, user_id = %user_id, ?outcome, "Cancel requested");

    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/tracks/{id}/recover
///
/// On-demand recovery: poll the provider for a track that looks stuck
/// and apply whatever it reports, exactly as the webhook would have.
pub async fn recover_track(
    identity: RequestIdentity,
    State(state): State<AppState>,
    Path(track_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let user_id = identity.require_user()?;
    find_and_authorize_track(&state.pool, track_id, user_id, "recover").await?;

    let outcome = state.detector.recover_job(track_id).await?;

    Ok(Json(DataResponse { data: outcome }))
}

// ---------------------------------------------------------------------------
// Sanitization
// ---------------------------------------------------------------------------

/// Run every free-text field through the sanitizer and assemble the
/// pipeline input. Invalid input degrades (empty/None/clamped), it is
/// not rejected here — semantic checks are the orchestrator's job.
#[allow(clippy::too_many_arguments)]
fn sanitize_track_fields(
    user_id: tuneforge_core::types::UserId,
    track_id: Option<DbId>,
    provider: Provider,
    title: Option<String>,
    prompt: Option<String>,
    lyrics: Option<String>,
    style_tags: Option<Vec<String>>,
    genre: Option<String>,
    mood: Option<String>,
    has_vocals: Option<bool>,
    model_version: Option<String>,
) -> GenerationInput {
    let title = title
        .as_deref()
        .map(sanitize::sanitize_title)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let prompt = prompt
        .as_deref()
        .map(sanitize::sanitize_prompt)
        .unwrap_or_default();

    let lyrics = lyrics
        .as_deref()
        .map(sanitize::sanitize_lyrics)
        .filter(|l| !l.is_empty());

    let style_tags = style_tags
        .map(sanitize::sanitize_style_tags)
        .unwrap_or_default();

    let genre = genre
        .as_deref()
        .map(|g| sanitize::sanitize_string(g, 100))
        .filter(|g| !g.is_empty());

    let mood = mood
        .as_deref()
        .map(|m| sanitize::sanitize_string(m, 100))
        .filter(|m| !m.is_empty());

    let model_version = model_version
        .as_deref()
        .map(|m| sanitize::sanitize_string(m, 50))
        .filter(|m| !m.is_empty());

    GenerationInput {
        user_id,
        track_id,
        title,
        prompt,
        lyrics,
        style_tags,
        genre,
        mood,
        has_vocals: has_vocals.unwrap_or(true),
        provider,
        model_version,
    }
}
