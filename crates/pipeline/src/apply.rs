//! The single funnel for provider results.
//!
//! A generation result can arrive twice for the same track — once via
//! webhook, once via a recovery poll — and the two can race. Both
//! paths call [`apply_provider_result`], which drives the status state
//! machine through the repository's conditional updates: exactly one
//! racing writer wins, the loser observes a guard rejection, and a
//! cancelled track can never be resurrected into `completed`.

use std::sync::Arc;

use tuneforge_db::models::generation_job::GenerationJob;
use tuneforge_db::models::status::TrackStatus;
use tuneforge_db::models::track::Track;
use tuneforge_db::models::version::NewTrackVersion;
use tuneforge_db::repositories::{GenerationJobRepo, TrackRepo};
use tuneforge_db::DbPool;
use tuneforge_events::{names, EventBus, PlatformEvent};
use tuneforge_providers::{NormalizedResult, RenderedVariant};

use crate::error::PipelineError;
use crate::recovery::MAX_POLLING_ATTEMPTS;

/// Which write path delivered the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplySource {
    /// The provider called our webhook.
    Webhook,
    /// The stuck-job detector polled the provider.
    Recovery,
}

impl ApplySource {
    fn label(self) -> &'static str {
        match self {
            ApplySource::Webhook => "webhook",
            ApplySource::Recovery => "stuck-sync",
        }
    }
}

/// What applying a provider result did to the track.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Track transitioned to `completed`; `versions` renders attached.
    Completed { versions: usize },
    /// Track transitioned to `failed` with the provider's reason.
    Failed { reason: String },
    /// Provider still working; metadata updated, no state change.
    StillInProgress {
        attempts: i32,
        max_attempts: i32,
        stage: Option<String>,
    },
    /// Provider paused for a human choice; surfaced, no state change.
    AwaitingInput,
    /// The optimistic guard rejected the write — the track had already
    /// left `processing` (e.g. cancelled, or the other path won).
    RejectedByGuard,
}

/// Apply a normalized provider result to a track.
///
/// `job` is the ledger row for the outstanding request, when known;
/// its terminal status is updated alongside the track's.
pub async fn apply_provider_result(
    pool: &DbPool,
    bus: &Arc<EventBus>,
    track: &Track,
    job: Option<&GenerationJob>,
    result: NormalizedResult,
    source: ApplySource,
) -> Result<ApplyOutcome, PipelineError> {
    match result {
        NormalizedResult::Completed { variants } => {
            apply_completed(pool, bus, track, job, variants, source).await
        }
        NormalizedResult::Failed { reason } => {
            apply_failed(pool, bus, track, job, reason, source).await
        }
        NormalizedResult::InProgress { stage } => {
            apply_in_progress(pool, track, job, stage, source).await
        }
        NormalizedResult::RequiresUserInput {
            kind: _,
            job_id,
            options,
        } => {
            // Keep the track `processing`; the pause is surfaced through
            // metadata and an event so the UI can offer the choice.
            let patch = serde_json::json!({
                "stage": "awaiting_lyrics_selection",
                "lyrics_job_id": job_id,
                "lyrics_options": options,
            });
            TrackRepo::merge_metadata(pool, track.id, &patch).await?;

            bus.publish(
                PlatformEvent::new(names::TRACK_AWAITING_INPUT)
                    .with_source("track", track.id)
                    .with_payload(patch),
            );

            tracing::info!(track_id = track.id, "Track awaiting lyrics selection");
            Ok(ApplyOutcome::AwaitingInput)
        }
    }
}

async fn apply_completed(
    pool: &DbPool,
    bus: &Arc<EventBus>,
    track: &Track,
    job: Option<&GenerationJob>,
    variants: Vec<RenderedVariant>,
    source: ApplySource,
) -> Result<ApplyOutcome, PipelineError> {
    // A "completed" result with nothing playable must not complete the
    // track: completion requires at least one version with audio.
    let playable: Vec<NewTrackVersion> = variants
        .iter()
        .filter(|v| v.audio_url.is_some())
        .map(new_version_from_variant)
        .collect();

    if playable.is_empty() {
        return apply_failed(
            pool,
            bus,
            track,
            job,
            "Provider reported success but delivered no audio".to_string(),
            source,
        )
        .await;
    }

    let attached = TrackRepo::complete_with_versions(pool, track.id, &playable).await?;

    let Some(versions) = attached else {
        // Guard rejected: the track already left `processing` (manual
        // cancel, or the other write path got here first). Record for
        // support diagnosis, change nothing.
        if let Some(job) = job {
            GenerationJobRepo::record_note(
                pool,
                job.id,
                &format!("late completion via {} rejected: track no longer processing", source.label()),
            )
            .await?;
        }
        tracing::warn!(
            track_id = track.id,
            source = source.label(),
            "Completion rejected by status guard",
        );
        return Ok(ApplyOutcome::RejectedByGuard);
    };

    if let Some(job) = job {
        GenerationJobRepo::complete(pool, job.id).await?;
    }

    let mut patch = serde_json::json!({
        "stage": "complete",
        "completed_at": chrono::Utc::now(),
    });
    if source == ApplySource::Recovery {
        patch["recovered_via"] = serde_json::json!(source.label());
    }
    TrackRepo::merge_metadata(pool, track.id, &patch).await?;

    bus.publish(
        PlatformEvent::new(names::TRACK_COMPLETED)
            .with_source("track", track.id)
            .with_payload(serde_json::json!({
                "versions": versions.len(),
                "source": source.label(),
            })),
    );

    tracing::info!(
        track_id = track.id,
        versions = versions.len(),
        source = source.label(),
        "Track completed",
    );

    Ok(ApplyOutcome::Completed {
        versions: versions.len(),
    })
}

async fn apply_failed(
    pool: &DbPool,
    bus: &Arc<EventBus>,
    track: &Track,
    job: Option<&GenerationJob>,
    reason: String,
    source: ApplySource,
) -> Result<ApplyOutcome, PipelineError> {
    let transitioned = TrackRepo::transition_status(
        pool,
        track.id,
        TrackStatus::Processing,
        TrackStatus::Failed,
        Some(&reason),
    )
    .await?;

    if !transitioned {
        if let Some(job) = job {
            GenerationJobRepo::record_note(
                pool,
                job.id,
                &format!("late failure via {} rejected: track no longer processing", source.label()),
            )
            .await?;
        }
        return Ok(ApplyOutcome::RejectedByGuard);
    }

    if let Some(job) = job {
        GenerationJobRepo::fail(pool, job.id, &reason).await?;
    }

    TrackRepo::merge_metadata(
        pool,
        track.id,
        &serde_json::json!({ "failed_at": chrono::Utc::now() }),
    )
    .await?;

    bus.publish(
        PlatformEvent::new(names::TRACK_FAILED)
            .with_source("track", track.id)
            .with_payload(serde_json::json!({
                "reason": &reason,
                "source": source.label(),
            })),
    );

    tracing::warn!(track_id = track.id, reason = %reason, "Track failed");

    Ok(ApplyOutcome::Failed { reason })
}

async fn apply_in_progress(
    pool: &DbPool,
    track: &Track,
    job: Option<&GenerationJob>,
    stage: Option<String>,
    source: ApplySource,
) -> Result<ApplyOutcome, PipelineError> {
    // Only the recovery path counts attempts — webhooks deliver stage
    // hints ("text", "first") but are not polls.
    let attempts = match source {
        ApplySource::Recovery => {
            if let Some(job) = job {
                GenerationJobRepo::increment_polling_attempts(pool, job.id).await?;
            }
            TrackRepo::increment_polling_attempts(pool, track.id).await?
        }
        ApplySource::Webhook => 0,
    };

    if let Some(stage) = &stage {
        TrackRepo::merge_metadata(pool, track.id, &serde_json::json!({ "stage": stage })).await?;
    }

    Ok(ApplyOutcome::StillInProgress {
        attempts,
        max_attempts: MAX_POLLING_ATTEMPTS,
        stage,
    })
}

/// Build the persisted version row from a normalized render. The full
/// variant is kept in the version's metadata for diagnosis.
fn new_version_from_variant(variant: &RenderedVariant) -> NewTrackVersion {
    NewTrackVersion {
        audio_url: variant.audio_url.clone(),
        video_url: variant.video_url.clone(),
        cover_url: variant.cover_url.clone(),
        duration_secs: variant.duration_secs,
        provider_version_id: variant.provider_version_id.clone(),
        lyrics: variant.lyrics.clone(),
        metadata: serde_json::to_value(variant).unwrap_or_else(|_| serde_json::json!({})),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_rows_carry_the_variant_fields() {
        let variant = RenderedVariant {
            provider_version_id: Some("clip-1".into()),
            audio_url: Some("https://cdn/a.mp3".into()),
            cover_url: Some("https://cdn/a.webp".into()),
            duration_secs: Some(61),
            lyrics: Some("la la".into()),
            ..Default::default()
        };

        let row = new_version_from_variant(&variant);
        assert_eq!(row.audio_url.as_deref(), Some("https://cdn/a.mp3"));
        assert_eq!(row.duration_secs, Some(61));
        assert_eq!(row.provider_version_id.as_deref(), Some("clip-1"));
        assert_eq!(row.metadata["audio_url"], "https://cdn/a.mp3");
    }

    #[test]
    fn source_labels_are_stable() {
        // These labels land in track metadata and the ledger; renaming
        // them would orphan historical rows.
        assert_eq!(ApplySource::Webhook.label(), "webhook");
        assert_eq!(ApplySource::Recovery.label(), "stuck-sync");
    }
}
