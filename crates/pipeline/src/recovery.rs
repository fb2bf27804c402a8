//! Stuck-job detection and recovery.
//!
//! Webhook delivery is best-effort: a provider can finish (or fail) a
//! job without the callback ever reaching us. [`StuckJobDetector`]
//! periodically finds tracks stranded in `processing`, re-polls their
//! provider, and feeds whatever it learns through the same
//! [`apply`](crate::apply) funnel a webhook would have used — so a lost
//! callback and a delivered one are indistinguishable afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tuneforge_core::error::CoreError;
use tuneforge_core::types::{DbId, Provider};
use tuneforge_db::models::status::TrackStatus;
use tuneforge_db::models::track::{Track, TrackMetadata};
use tuneforge_db::repositories::{GenerationJobRepo, TrackRepo};
use tuneforge_db::DbPool;
use tuneforge_events::{names, EventBus, PlatformEvent};
use tuneforge_providers::ProviderRegistry;

use crate::apply::{apply_provider_result, ApplyOutcome, ApplySource};
use crate::error::PipelineError;

/// Failure reason recorded for user-initiated cancellation.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Ceiling for recovery polls per job, surfaced to the UI as
/// "attempt N/60" so a spinner can show bounded progress.
pub const MAX_POLLING_ATTEMPTS: i32 = 60;

/// Minutes in `processing` before the UI shows an informational hint.
pub const STUCK_INFO_MINUTES: i64 = 5;

/// Minutes before the "check status" affordance appears; also the
/// default scan cutoff.
pub const STUCK_ACTIONABLE_MINUTES: i64 = 10;

/// Minutes before cancellation is offered and a job with no provider
/// task id is written off.
pub const STUCK_CANCELLABLE_MINUTES: i64 = 15;

// ---------------------------------------------------------------------------
// Stuck levels
// ---------------------------------------------------------------------------

/// How worried the UI should be about a `processing` track's age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckLevel {
    /// Older than 5 minutes: show an informational note.
    Informational,
    /// Older than 10 minutes: offer "check status".
    Actionable,
    /// Older than 15 minutes: offer cancellation.
    Cancellable,
}

impl StuckLevel {
    /// Classify a `processing` track's age. `None` means not stuck yet.
    pub fn for_age(age: chrono::Duration) -> Option<Self> {
        let minutes = age.num_minutes();
        if minutes >= STUCK_CANCELLABLE_MINUTES {
            Some(StuckLevel::Cancellable)
        } else if minutes >= STUCK_ACTIONABLE_MINUTES {
            Some(StuckLevel::Actionable)
        } else if minutes >= STUCK_INFO_MINUTES {
            Some(StuckLevel::Informational)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What recovering a single track achieved.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Provider had finished; the result was applied as if the
    /// callback had arrived.
    Completed { versions: usize },
    /// Provider had failed (or the job never reached it).
    Failed { reason: String },
    /// Provider still working; counter bumped, nothing forced.
    StillProcessing {
        attempts: i32,
        max_attempts: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
    /// Provider paused for user input.
    AwaitingInput,
    /// Another write path got there first; nothing changed.
    RejectedByGuard,
    /// The track was not in `processing` to begin with.
    NotProcessing { status: &'static str },
    /// The poll itself failed; the job stays `processing`.
    PollFailed { attempts: i32 },
}

/// Result of a manual cancellation request.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The track moved `processing -> failed`.
    Cancelled,
    /// The track was already failed; cancelling twice is a no-op.
    AlreadyCancelled,
    /// The track is in a state cancellation does not apply to.
    NotCancellable { status: &'static str },
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Periodic/on-demand reconciliation of tracks stuck in `processing`.
pub struct StuckJobDetector {
    pool: DbPool,
    registry: Arc<ProviderRegistry>,
    bus: Arc<EventBus>,
}

impl StuckJobDetector {
    pub fn new(pool: DbPool, registry: Arc<ProviderRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            pool,
            registry,
            bus,
        }
    }

    /// IDs of `processing` tracks older than `max_age_minutes`,
    /// oldest first (bounded batch).
    pub async fn scan_stuck_jobs(
        &self,
        max_age_minutes: i64,
    ) -> Result<Vec<DbId>, PipelineError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::minutes(max_age_minutes);
        let tracks = TrackRepo::find_stuck(&self.pool, cutoff).await?;
        Ok(tracks.iter().map(|t| t.id).collect())
    }

    /// Scan with the default cutoff and attempt recovery on every
    /// candidate. Per-track failures are recorded in the report, not
    /// propagated — one broken track must not stall the sweep.
    pub async fn run_scan(&self) -> Result<Vec<(DbId, RecoveryOutcome)>, PipelineError> {
        let candidates = self.scan_stuck_jobs(STUCK_ACTIONABLE_MINUTES).await?;

        if candidates.is_empty() {
            tracing::debug!("Stuck-track scan found nothing");
            return Ok(Vec::new());
        }

        tracing::info!(count = candidates.len(), "Checking stuck tracks");

        let mut outcomes = Vec::with_capacity(candidates.len());
        for track_id in candidates {
            match self.recover_job(track_id).await {
                Ok(outcome) => outcomes.push((track_id, outcome)),
                Err(e) => {
                    tracing::error!(track_id, error = %e, "Error recovering stuck track");
                    outcomes.push((
                        track_id,
                        RecoveryOutcome::PollFailed { attempts: 0 },
                    ));
                }
            }
        }

        Ok(outcomes)
    }

    /// Reconcile one track against its provider.
    pub async fn recover_job(&self, track_id: DbId) -> Result<RecoveryOutcome, PipelineError> {
        let track = TrackRepo::find_by_id(&self.pool, track_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Track",
                id: track_id,
            })?;

        let status = TrackStatus::from_id(track.status_id).ok_or_else(|| {
            CoreError::Internal(format!("Track {} has unknown status", track.id))
        })?;
        if status != TrackStatus::Processing {
            return Ok(RecoveryOutcome::NotProcessing {
                status: status.name(),
            });
        }

        let job = GenerationJobRepo::find_active_for_track(&self.pool, track.id, &track.provider)
            .await?;
        let meta = TrackMetadata::from_value(&track.metadata);
        let task_id = meta
            .provider_task_id
            .clone()
            .or_else(|| job.as_ref().and_then(|j| j.provider_task_id.clone()));

        let Some(task_id) = task_id else {
            return self.handle_missing_task_id(&track, job.as_ref()).await;
        };

        let provider = Provider::parse(&track.provider)
            .map_err(|_| CoreError::Internal(format!("Track {} has unknown provider", track.id)))?;
        let adapter =
            self.registry
                .get(provider)
                .ok_or(PipelineError::AdapterUnavailable {
                    provider: provider.as_str(),
                })?;

        tracing::info!(track_id = track.id, task_id = %task_id, "Querying provider for stuck track");

        let result = match adapter.poll_status(&task_id).await {
            Ok(result) => result,
            Err(e) => {
                // Reconciliation errors leave the job `processing`:
                // log, bump the counter, force nothing.
                tracing::error!(track_id = track.id, error = %e, "Recovery poll failed");
                if let Some(job) = &job {
                    GenerationJobRepo::increment_polling_attempts(&self.pool, job.id).await?;
                }
                let attempts =
                    TrackRepo::increment_polling_attempts(&self.pool, track.id).await?;
                return Ok(RecoveryOutcome::PollFailed { attempts });
            }
        };

        let outcome = apply_provider_result(
            &self.pool,
            &self.bus,
            &track,
            job.as_ref(),
            result,
            ApplySource::Recovery,
        )
        .await?;

        if matches!(outcome, ApplyOutcome::Completed { .. } | ApplyOutcome::Failed { .. }) {
            // A terminal result reached us by polling: the callback was
            // lost somewhere, worth an event of its own.
            self.bus.publish(
                PlatformEvent::new(names::TRACK_RECOVERED)
                    .with_source("track", track.id)
                    .with_payload(serde_json::json!({ "task_id": task_id })),
            );
        }

        Ok(match outcome {
            ApplyOutcome::Completed { versions } => RecoveryOutcome::Completed { versions },
            ApplyOutcome::Failed { reason } => RecoveryOutcome::Failed { reason },
            ApplyOutcome::StillInProgress {
                attempts,
                max_attempts,
                stage,
            } => RecoveryOutcome::StillProcessing {
                attempts,
                max_attempts,
                stage,
            },
            ApplyOutcome::AwaitingInput => RecoveryOutcome::AwaitingInput,
            ApplyOutcome::RejectedByGuard => RecoveryOutcome::RejectedByGuard,
        })
    }

    /// Explicit user cancellation: authoritative locally, advisory to
    /// the provider. Safe to invoke twice — the second call observes
    /// the `failed` row and reports [`CancelOutcome::AlreadyCancelled`].
    pub async fn cancel_track(&self, track_id: DbId) -> Result<CancelOutcome, PipelineError> {
        let track = TrackRepo::find_by_id(&self.pool, track_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Track",
                id: track_id,
            })?;

        let status = TrackStatus::from_id(track.status_id).ok_or_else(|| {
            CoreError::Internal(format!("Track {} has unknown status", track.id))
        })?;

        match status {
            TrackStatus::Failed => return Ok(CancelOutcome::AlreadyCancelled),
            TrackStatus::Processing => {}
            other => {
                return Ok(CancelOutcome::NotCancellable {
                    status: other.name(),
                })
            }
        }

        let transitioned = TrackRepo::transition_status(
            &self.pool,
            track.id,
            TrackStatus::Processing,
            TrackStatus::Failed,
            Some(CANCELLED_BY_USER),
        )
        .await?;

        if !transitioned {
            // Raced with a callback or another cancel; the row is
            // terminal now either way.
            return Ok(CancelOutcome::AlreadyCancelled);
        }

        if let Some(job) =
            GenerationJobRepo::find_active_for_track(&self.pool, track.id, &track.provider).await?
        {
            GenerationJobRepo::fail(&self.pool, job.id, CANCELLED_BY_USER).await?;

            // Best-effort remote stop. The local `failed` status is
            // already authoritative; a provider that keeps rendering
            // will have its late callback rejected by the guard.
            if let (Ok(provider), Some(task_id)) =
                (Provider::parse(&track.provider), job.provider_task_id.clone())
            {
                if let Some(adapter) = self.registry.get(provider) {
                    if let Err(e) = adapter.cancel(&task_id).await {
                        tracing::warn!(
                            track_id = track.id,
                            error = %e,
                            "Advisory provider cancel failed (track already failed locally)",
                        );
                    }
                }
            }
        }

        self.bus.publish(
            PlatformEvent::new(names::TRACK_CANCELLED)
                .with_source("track", track.id)
                .with_payload(serde_json::json!({ "reason": CANCELLED_BY_USER })),
        );

        tracing::info!(track_id = track.id, "Track cancelled by user");
        Ok(CancelOutcome::Cancelled)
    }

    /// A `processing` track with no provider task id never made it to
    /// the provider. Give the submission path a grace period, then
    /// write it off.
    async fn handle_missing_task_id(
        &self,
        track: &Track,
        job: Option<&tuneforge_db::models::generation_job::GenerationJob>,
    ) -> Result<RecoveryOutcome, PipelineError> {
        let age = chrono::Utc::now() - track.created_at;
        if age.num_minutes() < STUCK_CANCELLABLE_MINUTES {
            let attempts = TrackRepo::increment_polling_attempts(&self.pool, track.id).await?;
            return Ok(RecoveryOutcome::StillProcessing {
                attempts,
                max_attempts: MAX_POLLING_ATTEMPTS,
                stage: None,
            });
        }

        let reason = "No provider task ID — generation may have failed to start";
        let transitioned = TrackRepo::transition_status(
            &self.pool,
            track.id,
            TrackStatus::Processing,
            TrackStatus::Failed,
            Some(reason),
        )
        .await?;

        if !transitioned {
            return Ok(RecoveryOutcome::RejectedByGuard);
        }

        if let Some(job) = job {
            GenerationJobRepo::fail(&self.pool, job.id, reason).await?;
        }

        self.bus.publish(
            PlatformEvent::new(names::TRACK_FAILED)
                .with_source("track", track.id)
                .with_payload(serde_json::json!({ "reason": reason })),
        );

        tracing::warn!(track_id = track.id, "Track failed: no provider task id");
        Ok(RecoveryOutcome::Failed {
            reason: reason.to_string(),
        })
    }

    /// Run the reconciliation loop until `cancel` is triggered.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Stuck-track detector started"
        );

        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Stuck-track detector stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_scan().await {
                        Ok(outcomes) if !outcomes.is_empty() => {
                            tracing::info!(checked = outcomes.len(), "Stuck-track scan complete");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Stuck-track scan failed");
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
