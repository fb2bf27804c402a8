//! Integration tests for the generation pipeline against a real
//! database and a scripted in-memory provider adapter:
//! - idempotent submission
//! - submission failure handling
//! - the full two-render completion scenario
//! - late-callback rejection after manual cancel
//! - stuck-job promotion via recovery polling

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use tuneforge_core::types::Provider;
use tuneforge_db::models::status::TrackStatus;
use tuneforge_db::repositories::{GenerationJobRepo, TrackRepo, VersionRepo};
use tuneforge_events::EventBus;
use tuneforge_pipeline::{
    apply_provider_result, ApplyOutcome, ApplySource, CancelOutcome, GenerationInput,
    GenerationOrchestrator, PipelineError, RecoveryOutcome, StuckJobDetector,
};
use tuneforge_providers::{
    CallbackEnvelope, GenerationRequest, NormalizedResult, ProviderAdapter, ProviderError,
    ProviderRegistry, RenderedVariant, SubmittedJob,
};

// ---------------------------------------------------------------------------
// Scripted adapter
// ---------------------------------------------------------------------------

enum SubmitScript {
    Ok(&'static str),
    ApiError(u16, &'static str),
}

enum PollScript {
    Completed(Vec<RenderedVariant>),
    Failed(&'static str),
    InProgress(&'static str),
    TransportError,
}

/// An adapter whose submit/poll behavior is scripted per test.
struct ScriptedAdapter {
    submits: Mutex<VecDeque<SubmitScript>>,
    polls: Mutex<VecDeque<PollScript>>,
}

impl ScriptedAdapter {
    fn new() -> Self {
        Self {
            submits: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
        }
    }

    fn script_submit(&self, script: SubmitScript) {
        self.submits.lock().unwrap().push_back(script);
    }

    fn script_poll(&self, script: PollScript) {
        self.polls.lock().unwrap().push_back(script);
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider(&self) -> Provider {
        Provider::Suno
    }

    async fn submit(&self, _request: &GenerationRequest) -> Result<SubmittedJob, ProviderError> {
        match self.submits.lock().unwrap().pop_front() {
            Some(SubmitScript::Ok(task_id)) => Ok(SubmittedJob {
                provider_task_id: task_id.to_string(),
            }),
            Some(SubmitScript::ApiError(status, body)) => Err(ProviderError::Api {
                provider: "suno",
                status,
                body: body.to_string(),
            }),
            None => Ok(SubmittedJob {
                provider_task_id: "task-default".to_string(),
            }),
        }
    }

    fn interpret_callback(
        &self,
        _payload: &serde_json::Value,
    ) -> Result<CallbackEnvelope, ProviderError> {
        Ok(CallbackEnvelope {
            task_id: "unused".to_string(),
            result: NormalizedResult::InProgress { stage: None },
        })
    }

    async fn poll_status(&self, _task_id: &str) -> Result<NormalizedResult, ProviderError> {
        match self.polls.lock().unwrap().pop_front() {
            Some(PollScript::Completed(variants)) => Ok(NormalizedResult::Completed { variants }),
            Some(PollScript::Failed(reason)) => Ok(NormalizedResult::Failed {
                reason: reason.to_string(),
            }),
            Some(PollScript::InProgress(stage)) => Ok(NormalizedResult::InProgress {
                stage: Some(stage.to_string()),
            }),
            Some(PollScript::TransportError) => Err(ProviderError::Api {
                provider: "suno",
                status: 503,
                body: "unavailable".to_string(),
            }),
            None => Ok(NormalizedResult::InProgress { stage: None }),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    pool: PgPool,
    adapter: Arc<ScriptedAdapter>,
    orchestrator: GenerationOrchestrator,
    detector: StuckJobDetector,
    bus: Arc<EventBus>,
}

fn harness(pool: PgPool) -> Harness {
    let adapter = Arc::new(ScriptedAdapter::new());
    let mut registry = ProviderRegistry::new();
    registry.register(adapter.clone());
    let registry = Arc::new(registry);
    let bus = Arc::new(EventBus::default());

    Harness {
        orchestrator: GenerationOrchestrator::new(
            pool.clone(),
            Arc::clone(&registry),
            Arc::clone(&bus),
        ),
        detector: StuckJobDetector::new(pool.clone(), registry, Arc::clone(&bus)),
        adapter,
        bus,
        pool,
    }
}

fn input() -> GenerationInput {
    GenerationInput {
        user_id: uuid::Uuid::new_v4(),
        track_id: None,
        title: "Ambient Pad".to_string(),
        prompt: "ambient pad, 60s".to_string(),
        lyrics: None,
        style_tags: vec!["ambient".to_string()],
        genre: None,
        mood: None,
        has_vocals: false,
        provider: Provider::Suno,
        model_version: None,
    }
}

fn render(id: &str, audio: &str) -> RenderedVariant {
    RenderedVariant {
        provider_version_id: Some(id.to_string()),
        audio_url: Some(audio.to_string()),
        duration_secs: Some(60),
        ..Default::default()
    }
}

async fn backdate(pool: &PgPool, track_id: i64, minutes: i64) {
    sqlx::query("UPDATE tracks SET created_at = NOW() - make_interval(mins => $2) WHERE id = $1")
        .bind(track_id)
        .bind(minutes as i32)
        .execute(pool)
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn submission_moves_track_to_processing(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));

    let receipt = h
        .orchestrator
        .submit_generation(input(), Some("nonce-1".to_string()))
        .await
        .unwrap();

    assert!(!receipt.reused);
    assert_eq!(receipt.provider_task_id.as_deref(), Some("task-1"));

    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(track.status_id, TrackStatus::Processing.id());
    assert_eq!(track.metadata["provider_task_id"], "task-1");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn same_nonce_reuses_the_job(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));

    let mut request = input();
    let first = h
        .orchestrator
        .submit_generation(request.clone(), Some("nonce-1".to_string()))
        .await
        .unwrap();

    // Retry against the existing track with the same nonce: no second
    // provider call, no second ledger row.
    request.track_id = Some(first.track_id);
    let second = h
        .orchestrator
        .submit_generation(request, Some("nonce-1".to_string()))
        .await
        .unwrap();

    assert!(second.reused);
    assert_eq!(second.track_id, first.track_id);
    assert_eq!(second.provider_task_id, first.provider_task_id);

    let (jobs,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM generation_jobs WHERE track_id = $1")
            .bind(first.track_id)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(jobs, 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn fatal_submit_error_fails_the_track_verbatim(pool: PgPool) {
    let h = harness(pool);
    h.adapter
        .script_submit(SubmitScript::ApiError(402, "payment required"));

    let result = h
        .orchestrator
        .submit_generation(input(), Some("nonce-1".to_string()))
        .await;

    assert!(matches!(result, Err(PipelineError::Provider(_))));

    let (track_id,): (i64,) = sqlx::query_as("SELECT id FROM tracks ORDER BY id DESC LIMIT 1")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    let track = TrackRepo::find_by_id(&h.pool, track_id).await.unwrap().unwrap();
    assert_eq!(track.status_id, TrackStatus::Failed.id());
    // The provider's reason survives for support diagnosis.
    assert!(track.error_message.unwrap().contains("payment required"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn manual_provider_is_rejected(pool: PgPool) {
    let h = harness(pool);
    let mut request = input();
    request.provider = Provider::Manual;

    let result = h.orchestrator.submit_generation(request, None).await;
    assert!(matches!(
        result,
        Err(PipelineError::Core(
            tuneforge_core::error::CoreError::Validation(_)
        ))
    ));
}

// ---------------------------------------------------------------------------
// Completion (the end-to-end scenario)
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn two_render_completion_end_to_end(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));

    let receipt = h
        .orchestrator
        .submit_generation(input(), Some("nonce-1".to_string()))
        .await
        .unwrap();

    // The provider calls back with two simultaneous renders.
    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    let job = GenerationJobRepo::find_by_provider_task(&h.pool, "suno", "task-1")
        .await
        .unwrap()
        .unwrap();

    let outcome = apply_provider_result(
        &h.pool,
        &h.bus,
        &track,
        Some(&job),
        NormalizedResult::Completed {
            variants: vec![
                render("clip-a", "https://cdn/a.mp3"),
                render("clip-b", "https://cdn/b.mp3"),
            ],
        },
        ApplySource::Webhook,
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ApplyOutcome::Completed { versions: 2 }));

    // pending -> processing -> completed, two versions, 0 preferred.
    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(track.status_id, TrackStatus::Completed.id());

    let versions = VersionRepo::list_for_track(&h.pool, receipt.track_id)
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version_number, 0);
    assert_eq!(versions[1].version_number, 1);
    assert!(versions[0].is_preferred);
    assert!(!versions[1].is_preferred);

    // Flipping the preferred flag moves it exclusively to version 1.
    VersionRepo::set_preferred(&h.pool, receipt.track_id, versions[1].id)
        .await
        .unwrap()
        .unwrap();
    let versions = VersionRepo::list_for_track(&h.pool, receipt.track_id)
        .await
        .unwrap();
    assert!(!versions[0].is_preferred);
    assert!(versions[1].is_preferred);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn completion_without_audio_fails_the_track(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));
    let receipt = h
        .orchestrator
        .submit_generation(input(), None)
        .await
        .unwrap();
    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();

    let outcome = apply_provider_result(
        &h.pool,
        &h.bus,
        &track,
        None,
        NormalizedResult::Completed {
            variants: vec![RenderedVariant::default()],
        },
        ApplySource::Webhook,
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ApplyOutcome::Failed { .. }));
    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    // Never `completed` with zero playable content.
    assert_eq!(track.status_id, TrackStatus::Failed.id());
    assert_eq!(
        VersionRepo::count_for_track(&h.pool, receipt.track_id)
            .await
            .unwrap(),
        0
    );
}

// ---------------------------------------------------------------------------
// Cancellation & late callbacks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn late_callback_cannot_resurrect_a_cancelled_track(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));
    let receipt = h
        .orchestrator
        .submit_generation(input(), None)
        .await
        .unwrap();

    assert_eq!(
        h.detector.cancel_track(receipt.track_id).await.unwrap(),
        CancelOutcome::Cancelled
    );
    // Cancelling twice is a no-op success.
    assert_eq!(
        h.detector.cancel_track(receipt.track_id).await.unwrap(),
        CancelOutcome::AlreadyCancelled
    );

    // The provider's late completion arrives afterwards.
    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    let outcome = apply_provider_result(
        &h.pool,
        &h.bus,
        &track,
        None,
        NormalizedResult::Completed {
            variants: vec![render("clip-a", "https://cdn/a.mp3")],
        },
        ApplySource::Webhook,
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ApplyOutcome::RejectedByGuard));

    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(track.status_id, TrackStatus::Failed.id());
    assert_eq!(track.error_message.as_deref(), Some("cancelled by user"));
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn stuck_track_is_promoted_by_recovery_poll(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));
    let receipt = h
        .orchestrator
        .submit_generation(input(), None)
        .await
        .unwrap();
    backdate(&h.pool, receipt.track_id, 20).await;

    // The scan sees it; the provider now reports completion.
    let stuck = h.detector.scan_stuck_jobs(10).await.unwrap();
    assert_eq!(stuck, vec![receipt.track_id]);

    h.adapter.script_poll(PollScript::Completed(vec![render(
        "clip-a",
        "https://cdn/a.mp3",
    )]));

    let outcome = h.detector.recover_job(receipt.track_id).await.unwrap();
    assert!(matches!(outcome, RecoveryOutcome::Completed { versions: 1 }));

    // Promoted to completed without any webhook.
    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(track.status_id, TrackStatus::Completed.id());
    assert_eq!(track.metadata["recovered_via"], "stuck-sync");
    assert_eq!(
        VersionRepo::count_for_track(&h.pool, receipt.track_id)
            .await
            .unwrap(),
        1
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn still_running_poll_bumps_the_counter_only(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));
    let receipt = h
        .orchestrator
        .submit_generation(input(), None)
        .await
        .unwrap();
    backdate(&h.pool, receipt.track_id, 12).await;

    h.adapter.script_poll(PollScript::InProgress("streaming"));
    let outcome = h.detector.recover_job(receipt.track_id).await.unwrap();

    match outcome {
        RecoveryOutcome::StillProcessing {
            attempts,
            max_attempts,
            stage,
        } => {
            assert_eq!(attempts, 1);
            assert_eq!(max_attempts, 60);
            assert_eq!(stage.as_deref(), Some("streaming"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(track.status_id, TrackStatus::Processing.id());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_poll_leaves_the_job_processing(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));
    let receipt = h
        .orchestrator
        .submit_generation(input(), None)
        .await
        .unwrap();
    backdate(&h.pool, receipt.track_id, 12).await;

    h.adapter.script_poll(PollScript::TransportError);
    let outcome = h.detector.recover_job(receipt.track_id).await.unwrap();
    assert!(matches!(outcome, RecoveryOutcome::PollFailed { attempts: 1 }));

    let track = TrackRepo::find_by_id(&h.pool, receipt.track_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(track.status_id, TrackStatus::Processing.id());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn trackless_job_is_written_off_after_grace_period(pool: PgPool) {
    let h = harness(pool);

    // A track that reached `processing` but never got a task id
    // (crashed between the transition and the metadata write).
    let track = TrackRepo::create(
        &h.pool,
        &tuneforge_db::models::track::CreateTrack {
            user_id: uuid::Uuid::new_v4(),
            title: "t".to_string(),
            prompt: "p".to_string(),
            lyrics: None,
            style_tags: None,
            genre: None,
            mood: None,
            has_vocals: true,
            provider: "suno".to_string(),
            model_version: None,
            metadata: serde_json::json!({}),
        },
        TrackStatus::Pending,
    )
    .await
    .unwrap();
    TrackRepo::transition_status(
        &h.pool,
        track.id,
        TrackStatus::Pending,
        TrackStatus::Processing,
        None,
    )
    .await
    .unwrap();
    backdate(&h.pool, track.id, 20).await;

    let outcome = h.detector.recover_job(track.id).await.unwrap();
    assert!(matches!(outcome, RecoveryOutcome::Failed { .. }));

    let reloaded = TrackRepo::find_by_id(&h.pool, track.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_id, TrackStatus::Failed.id());
    assert!(reloaded.error_message.unwrap().contains("No provider task ID"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn recovery_of_terminal_track_is_a_noop(pool: PgPool) {
    let h = harness(pool);
    h.adapter.script_submit(SubmitScript::Ok("task-1"));
    let receipt = h
        .orchestrator
        .submit_generation(input(), None)
        .await
        .unwrap();
    h.detector.cancel_track(receipt.track_id).await.unwrap();

    let outcome = h.detector.recover_job(receipt.track_id).await.unwrap();
    assert!(matches!(
        outcome,
        RecoveryOutcome::NotProcessing { status: "failed" }
    ));
}
