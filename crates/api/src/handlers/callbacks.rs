//! Provider webhook handlers.
//!
//! A callback is correlated by provider task id: first against the
//! stem table (derived jobs), then against the generation-job ledger.
//! Unmatched callbacks get a 202 — providers retry deliveries, and a
//! track created on another instance may not be visible yet. Matched
//! generation callbacks funnel through
//! [`apply_provider_result`](tuneforge_pipeline::apply_provider_result),
//! the same path the recovery poller uses.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tuneforge_core::types::Provider;
use tuneforge_db::models::stem::TrackStem;
use tuneforge_db::repositories::{GenerationJobRepo, StemRepo, TrackRepo};
use tuneforge_events::{names, PlatformEvent};
use tuneforge_pipeline::{apply_provider_result, ApplySource, PipelineError};
use tuneforge_providers::NormalizedResult;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/callbacks/suno
pub async fn suno_callback(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    handle_callback(state, Provider::Suno, payload).await
}

/// POST /api/v1/callbacks/mureka
pub async fn mureka_callback(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    handle_callback(state, Provider::Mureka, payload).await
}

async fn handle_callback(
    state: AppState,
    provider: Provider,
    payload: serde_json::Value,
) -> AppResult<axum::response::Response> {
    let adapter =
        state
            .registry
            .get(provider)
            .ok_or(AppError::Pipeline(PipelineError::AdapterUnavailable {
                provider: provider.as_str(),
            }))?;

    // A payload the adapter cannot interpret is the sender's problem.
    let envelope = adapter
        .interpret_callback(&payload)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    tracing::info!(
        provider = provider.as_str(),
        task_id = %envelope.task_id,
        "Callback received",
    );

    // Derived stem jobs first: their task ids live in track_stems.
    if let Some(stem) = StemRepo::find_by_provider_task(&state.pool, &envelope.task_id).await? {
        return apply_stem_result(&state, stem, envelope.result).await;
    }

    let Some(job) =
        GenerationJobRepo::find_by_provider_task(&state.pool, provider.as_str(), &envelope.task_id)
            .await?
    else {
        tracing::warn!(
            provider = provider.as_str(),
            task_id = %envelope.task_id,
            "Callback for unknown task",
        );
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "unmatched" })),
        )
            .into_response());
    };

    let Some(track) = TrackRepo::find_by_id(&state.pool, job.track_id).await? else {
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "unmatched" })),
        )
            .into_response());
    };

    let outcome = apply_provider_result(
        &state.pool,
        &state.event_bus,
        &track,
        Some(&job),
        envelope.result,
        ApplySource::Webhook,
    )
    .await?;

    Ok(Json(DataResponse { data: outcome }).into_response())
}

/// Apply a callback that belongs to a stem job.
async fn apply_stem_result(
    state: &AppState,
    stem: TrackStem,
    result: NormalizedResult,
) -> AppResult<axum::response::Response> {
    match result {
        NormalizedResult::Completed { variants } => {
            let audio_url = variants.iter().find_map(|v| v.audio_url.clone());
            let Some(audio_url) = audio_url else {
                StemRepo::fail(&state.pool, stem.id, "Provider delivered no stem audio").await?;
                return Ok(Json(serde_json::json!({ "status": "failed" })).into_response());
            };

            let updated = StemRepo::complete(&state.pool, stem.id, &audio_url).await?;
            if updated {
                state.event_bus.publish(
                    PlatformEvent::new(names::STEM_COMPLETED)
                        .with_source("stem", stem.id)
                        .with_payload(serde_json::json!({ "track_id": stem.track_id })),
                );
                tracing::info!(stem_id = stem.id, "Stem completed");
            }
            Ok(Json(serde_json::json!({ "status": "completed" })).into_response())
        }
        NormalizedResult::Failed { reason } => {
            let updated = StemRepo::fail(&state.pool, stem.id, &reason).await?;
            if updated {
                state.event_bus.publish(
                    PlatformEvent::new(names::STEM_FAILED)
                        .with_source("stem", stem.id)
                        .with_payload(serde_json::json!({ "reason": reason })),
                );
            }
            Ok(Json(serde_json::json!({ "status": "failed" })).into_response())
        }
        NormalizedResult::InProgress { .. } | NormalizedResult::RequiresUserInput { .. } => {
            Ok(Json(serde_json::json!({ "status": "in_progress" })).into_response())
        }
    }
}
