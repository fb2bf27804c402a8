//! Generation orchestrator: the state-machine entry point for new
//! submissions.
//!
//! Flow: resolve or create the track row → derive the idempotency
//! fingerprint → reuse any existing job for it → open a ledger row →
//! submit to the provider adapter → transition the track to
//! `processing` (or `failed`). Transport-level retries happen inside
//! the adapter; a submission that fails after that budget is final.

use std::sync::Arc;

use tuneforge_core::error::CoreError;
use tuneforge_core::idempotency;
use tuneforge_core::types::{DbId, Provider, UserId};
use tuneforge_db::models::status::TrackStatus;
use tuneforge_db::models::track::{CreateTrack, Track, TrackMetadata};
use tuneforge_db::repositories::{GenerationJobRepo, TrackRepo};
use tuneforge_db::DbPool;
use tuneforge_events::{names, EventBus, PlatformEvent};
use tuneforge_providers::{GenerationRequest, ProviderRegistry};

use crate::error::{is_unique_violation, PipelineError};

/// A provider-agnostic generation submission, already sanitized by the
/// API layer.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub user_id: UserId,
    /// An existing `pending`/`draft` track to promote; `None` creates a
    /// fresh track.
    pub track_id: Option<DbId>,
    pub title: String,
    pub prompt: String,
    pub lyrics: Option<String>,
    pub style_tags: Vec<String>,
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub has_vocals: bool,
    pub provider: Provider,
    pub model_version: Option<String>,
}

/// The result of a submission (or of replaying an idempotent retry).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubmissionReceipt {
    pub track_id: DbId,
    pub provider_task_id: Option<String>,
    /// `true` when an existing job was returned instead of creating a
    /// new one (client retry, double-click).
    pub reused: bool,
}

/// Owns track creation and provider dispatch.
pub struct GenerationOrchestrator {
    pool: DbPool,
    registry: Arc<ProviderRegistry>,
    bus: Arc<EventBus>,
}

impl GenerationOrchestrator {
    pub fn new(pool: DbPool, registry: Arc<ProviderRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            pool,
            registry,
            bus,
        }
    }

    /// Create a manual draft track. No provider call, no job ledger
    /// entry; the draft can be promoted later via
    /// [`submit_generation`](Self::submit_generation).
    pub async fn create_draft(&self, input: &GenerationInput) -> Result<Track, PipelineError> {
        let track = TrackRepo::create(
            &self.pool,
            &create_track_from_input(input),
            TrackStatus::Draft,
        )
        .await?;

        self.bus.publish(
            PlatformEvent::new(names::TRACK_CREATED)
                .with_source("track", track.id)
                .with_actor(input.user_id),
        );

        tracing::info!(track_id = track.id, "Draft track created");
        Ok(track)
    }

    /// Submit a generation request.
    ///
    /// `nonce` is the caller-supplied idempotency token; retrying with
    /// the same nonce returns the original job's receipt instead of
    /// creating (and billing) a second one. When absent, a fresh nonce
    /// is generated and the call is effectively non-idempotent.
    pub async fn submit_generation(
        &self,
        input: GenerationInput,
        nonce: Option<String>,
    ) -> Result<SubmissionReceipt, PipelineError> {
        if input.provider == Provider::Manual {
            return Err(CoreError::Validation(
                "Manual tracks are drafts; they cannot be submitted for generation".to_string(),
            )
            .into());
        }
        if input.prompt.is_empty() {
            return Err(CoreError::Validation("Prompt must not be empty".to_string()).into());
        }

        // 1. Resolve or create the track row.
        let track = self.resolve_track(&input).await?;

        // 2. Idempotency first — it must win over status gating so a
        // client retry against a track that already moved to
        // `processing` replays the receipt instead of conflicting.
        let nonce = nonce.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let fingerprint = idempotency::fingerprint(track.id, &nonce);

        if let Some(existing) =
            GenerationJobRepo::find_by_idempotency_key(&self.pool, &fingerprint).await?
        {
            tracing::info!(
                track_id = existing.track_id,
                job_id = existing.id,
                "Idempotent submission replayed",
            );
            return Ok(SubmissionReceipt {
                track_id: existing.track_id,
                provider_task_id: existing.provider_task_id,
                reused: true,
            });
        }

        if let Some(active) = GenerationJobRepo::find_active_for_track(
            &self.pool,
            track.id,
            input.provider.as_str(),
        )
        .await?
        {
            tracing::info!(
                track_id = track.id,
                job_id = active.id,
                "Submission while a job is in flight; reusing it",
            );
            return Ok(SubmissionReceipt {
                track_id: track.id,
                provider_task_id: active.provider_task_id,
                reused: true,
            });
        }

        // 3. Only a fresh submission is gated on the current status.
        let current_status =
            TrackStatus::from_id(track.status_id).ok_or_else(|| {
                CoreError::Internal(format!("Track {} has unknown status", track.id))
            })?;

        if !current_status.can_transition_to(TrackStatus::Processing) {
            return Err(CoreError::Conflict(format!(
                "Track {} is {} and cannot be submitted for generation",
                track.id,
                current_status.name(),
            ))
            .into());
        }

        // 4. Resolve the adapter before opening the ledger row so an
        // unconfigured provider cannot strand an active job.
        let adapter = self.registry.get(input.provider).ok_or(
            PipelineError::AdapterUnavailable {
                provider: input.provider.as_str(),
            },
        )?;

        // 5. Open the ledger row. A concurrent submission can still win
        // the race; the unique indexes decide, and the loser reuses.
        let job = match GenerationJobRepo::create_active(
            &self.pool,
            track.id,
            input.provider.as_str(),
            &fingerprint,
        )
        .await
        {
            Ok(job) => job,
            Err(e) if is_unique_violation(&e) => {
                let existing =
                    GenerationJobRepo::find_by_idempotency_key(&self.pool, &fingerprint)
                        .await?
                        .or(GenerationJobRepo::find_active_for_track(
                            &self.pool,
                            track.id,
                            input.provider.as_str(),
                        )
                        .await?);
                let Some(existing) = existing else {
                    return Err(PipelineError::Database(e));
                };
                return Ok(SubmissionReceipt {
                    track_id: existing.track_id,
                    provider_task_id: existing.provider_task_id,
                    reused: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        // 6. Dispatch to the provider.
        let request = generation_request_from_track(&track);

        match adapter.submit(&request).await {
            Ok(submitted) => {
                GenerationJobRepo::set_provider_task_id(
                    &self.pool,
                    job.id,
                    &submitted.provider_task_id,
                )
                .await?;

                let transitioned = TrackRepo::transition_status(
                    &self.pool,
                    track.id,
                    current_status,
                    TrackStatus::Processing,
                    None,
                )
                .await?;

                if !transitioned {
                    // Someone moved the track while we were talking to
                    // the provider (e.g. a concurrent delete/cancel).
                    GenerationJobRepo::record_note(
                        &self.pool,
                        job.id,
                        "track left submittable state during provider dispatch",
                    )
                    .await?;
                    return Err(CoreError::Conflict(format!(
                        "Track {} changed state during submission",
                        track.id
                    ))
                    .into());
                }

                let meta = TrackMetadata {
                    provider_task_id: Some(submitted.provider_task_id.clone()),
                    stage: Some("submitted".to_string()),
                    polling_attempts: Some(0),
                    started_at: Some(chrono::Utc::now()),
                    ..Default::default()
                };
                TrackRepo::merge_metadata(&self.pool, track.id, &meta.into_value()).await?;

                self.bus.publish(
                    PlatformEvent::new(names::TRACK_PROCESSING)
                        .with_source("track", track.id)
                        .with_actor(input.user_id)
                        .with_payload(serde_json::json!({
                            "provider": input.provider.as_str(),
                            "provider_task_id": &submitted.provider_task_id,
                        })),
                );

                tracing::info!(
                    track_id = track.id,
                    provider = input.provider.as_str(),
                    provider_task_id = %submitted.provider_task_id,
                    "Generation submitted",
                );

                Ok(SubmissionReceipt {
                    track_id: track.id,
                    provider_task_id: Some(submitted.provider_task_id),
                    reused: false,
                })
            }
            Err(provider_error) => {
                // The adapter already retried transient failures; this
                // is final. Preserve the provider's reason verbatim.
                let reason = provider_error.to_string();

                GenerationJobRepo::fail(&self.pool, job.id, &reason).await?;
                TrackRepo::transition_status(
                    &self.pool,
                    track.id,
                    current_status,
                    TrackStatus::Failed,
                    Some(&reason),
                )
                .await?;

                self.bus.publish(
                    PlatformEvent::new(names::TRACK_FAILED)
                        .with_source("track", track.id)
                        .with_actor(input.user_id)
                        .with_payload(serde_json::json!({ "reason": reason })),
                );

                tracing::error!(
                    track_id = track.id,
                    provider = input.provider.as_str(),
                    error = %provider_error,
                    "Provider submission failed",
                );

                Err(provider_error.into())
            }
        }
    }

    /// Load the caller's existing track, or create a fresh `pending`
    /// row from the input.
    async fn resolve_track(&self, input: &GenerationInput) -> Result<Track, PipelineError> {
        match input.track_id {
            Some(track_id) => {
                let track = TrackRepo::find_by_id(&self.pool, track_id)
                    .await?
                    .ok_or(CoreError::NotFound {
                        entity: "Track",
                        id: track_id,
                    })?;

                if track.user_id != input.user_id {
                    return Err(CoreError::Forbidden(
                        "Cannot submit another user's track".to_string(),
                    )
                    .into());
                }

                if track.provider != input.provider.as_str() {
                    return Err(CoreError::Conflict(format!(
                        "Track {} belongs to provider '{}'; exactly one provider per track",
                        track.id, track.provider,
                    ))
                    .into());
                }

                Ok(track)
            }
            None => {
                let track = TrackRepo::create(
                    &self.pool,
                    &create_track_from_input(input),
                    TrackStatus::Pending,
                )
                .await?;

                self.bus.publish(
                    PlatformEvent::new(names::TRACK_CREATED)
                        .with_source("track", track.id)
                        .with_actor(input.user_id),
                );

                Ok(track)
            }
        }
    }
}

fn create_track_from_input(input: &GenerationInput) -> CreateTrack {
    CreateTrack {
        user_id: input.user_id,
        title: input.title.clone(),
        prompt: input.prompt.clone(),
        lyrics: input.lyrics.clone(),
        style_tags: if input.style_tags.is_empty() {
            None
        } else {
            Some(input.style_tags.clone())
        },
        genre: input.genre.clone(),
        mood: input.mood.clone(),
        has_vocals: input.has_vocals,
        provider: input.provider.as_str().to_string(),
        model_version: input.model_version.clone(),
        metadata: serde_json::json!({}),
    }
}

/// Build the adapter request from the persisted track row — the row is
/// the source of truth once the track exists.
fn generation_request_from_track(track: &Track) -> GenerationRequest {
    GenerationRequest {
        track_id: track.id,
        title: track.title.clone(),
        prompt: track.prompt.clone(),
        lyrics: track.lyrics.clone(),
        style_tags: track.style_tags.clone().unwrap_or_default(),
        has_vocals: track.has_vocals,
        model_version: track.model_version.clone(),
    }
}
