//! Integration tests for the track lifecycle and its optimistic
//! concurrency guards:
//! - guarded status transitions (late results cannot resurrect a
//!   terminal track)
//! - atomic completion with version attachment
//! - metadata merging and polling counters
//! - stuck-track scanning

use sqlx::PgPool;
use tuneforge_db::models::status::TrackStatus;
use tuneforge_db::models::track::{CreateTrack, TrackListQuery, TrackMetadata};
use tuneforge_db::models::version::NewTrackVersion;
use tuneforge_db::repositories::{TrackRepo, VersionRepo};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_track(title: &str) -> CreateTrack {
    CreateTrack {
        user_id: uuid::Uuid::new_v4(),
        title: title.to_string(),
        prompt: "ambient pad, 60s".to_string(),
        lyrics: None,
        style_tags: Some(vec!["ambient".to_string(), "pad".to_string()]),
        genre: None,
        mood: None,
        has_vocals: false,
        provider: "suno".to_string(),
        model_version: None,
        metadata: serde_json::json!({}),
    }
}

fn version(audio: &str) -> NewTrackVersion {
    NewTrackVersion {
        audio_url: Some(audio.to_string()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn guarded_transition_applies_once(pool: PgPool) {
    let track = TrackRepo::create(&pool, &new_track("t"), TrackStatus::Pending)
        .await
        .unwrap();

    let ok = TrackRepo::transition_status(
        &pool,
        track.id,
        TrackStatus::Pending,
        TrackStatus::Processing,
        None,
    )
    .await
    .unwrap();
    assert!(ok);

    // Re-applying the same transition finds no row in `pending`.
    let again = TrackRepo::transition_status(
        &pool,
        track.id,
        TrackStatus::Pending,
        TrackStatus::Processing,
        None,
    )
    .await
    .unwrap();
    assert!(!again);

    let reloaded = TrackRepo::find_by_id(&pool, track.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_id, TrackStatus::Processing.id());
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_transition_preserves_reason(pool: PgPool) {
    let track = TrackRepo::create(&pool, &new_track("t"), TrackStatus::Pending)
        .await
        .unwrap();
    TrackRepo::transition_status(&pool, track.id, TrackStatus::Pending, TrackStatus::Processing, None)
        .await
        .unwrap();

    TrackRepo::transition_status(
        &pool,
        track.id,
        TrackStatus::Processing,
        TrackStatus::Failed,
        Some("payment required"),
    )
    .await
    .unwrap();

    let reloaded = TrackRepo::find_by_id(&pool, track.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_id, TrackStatus::Failed.id());
    assert_eq!(reloaded.error_message.as_deref(), Some("payment required"));
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn completion_attaches_versions_atomically(pool: PgPool) {
    let track = TrackRepo::create(&pool, &new_track("t"), TrackStatus::Pending)
        .await
        .unwrap();
    TrackRepo::transition_status(&pool, track.id, TrackStatus::Pending, TrackStatus::Processing, None)
        .await
        .unwrap();

    let attached = TrackRepo::complete_with_versions(
        &pool,
        track.id,
        &[version("https://cdn/a.mp3"), version("https://cdn/b.mp3")],
    )
    .await
    .unwrap()
    .expect("guard should pass");

    assert_eq!(attached.len(), 2);
    assert_eq!(attached[0].version_number, 0);
    assert_eq!(attached[1].version_number, 1);
    assert!(attached[0].is_preferred);
    assert!(!attached[1].is_preferred);

    let reloaded = TrackRepo::find_by_id(&pool, track.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_id, TrackStatus::Completed.id());
    // Denormalized pointer follows the preferred (canonical) version.
    assert_eq!(reloaded.audio_url.as_deref(), Some("https://cdn/a.mp3"));
}

#[sqlx::test(migrations = "./migrations")]
async fn late_completion_is_rejected_after_cancellation(pool: PgPool) {
    let track = TrackRepo::create(&pool, &new_track("t"), TrackStatus::Pending)
        .await
        .unwrap();
    TrackRepo::transition_status(&pool, track.id, TrackStatus::Pending, TrackStatus::Processing, None)
        .await
        .unwrap();

    // User cancels.
    TrackRepo::transition_status(
        &pool,
        track.id,
        TrackStatus::Processing,
        TrackStatus::Failed,
        Some("cancelled by user"),
    )
    .await
    .unwrap();

    // The provider's late result must bounce off the guard.
    let attached =
        TrackRepo::complete_with_versions(&pool, track.id, &[version("https://cdn/a.mp3")])
            .await
            .unwrap();
    assert!(attached.is_none());

    let reloaded = TrackRepo::find_by_id(&pool, track.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status_id, TrackStatus::Failed.id());
    assert_eq!(reloaded.error_message.as_deref(), Some("cancelled by user"));
    // And no versions leaked out of the rolled-back transaction.
    assert_eq!(VersionRepo::count_for_track(&pool, track.id).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn completed_track_always_has_a_version(pool: PgPool) {
    let track = TrackRepo::create(&pool, &new_track("t"), TrackStatus::Pending)
        .await
        .unwrap();
    TrackRepo::transition_status(&pool, track.id, TrackStatus::Pending, TrackStatus::Processing, None)
        .await
        .unwrap();
    TrackRepo::complete_with_versions(&pool, track.id, &[version("https://cdn/a.mp3")])
        .await
        .unwrap()
        .unwrap();

    let versions = VersionRepo::list_for_track(&pool, track.id).await.unwrap();
    assert!(!versions.is_empty());
    assert!(versions.iter().any(|v| v.audio_url.is_some()));
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn metadata_merge_preserves_existing_keys(pool: PgPool) {
    let track = TrackRepo::create(&pool, &new_track("t"), TrackStatus::Pending)
        .await
        .unwrap();

    TrackRepo::merge_metadata(&pool, track.id, &serde_json::json!({"provider_task_id": "t-1"}))
        .await
        .unwrap();
    TrackRepo::merge_metadata(&pool, track.id, &serde_json::json!({"stage": "submitted"}))
        .await
        .unwrap();

    let reloaded = TrackRepo::find_by_id(&pool, track.id).await.unwrap().unwrap();
    let meta = TrackMetadata::from_value(&reloaded.metadata);
    assert_eq!(meta.provider_task_id.as_deref(), Some("t-1"));
    assert_eq!(meta.stage.as_deref(), Some("submitted"));
}

#[sqlx::test(migrations = "./migrations")]
async fn polling_attempts_increment_atomically(pool: PgPool) {
    let track = TrackRepo::create(&pool, &new_track("t"), TrackStatus::Pending)
        .await
        .unwrap();

    assert_eq!(TrackRepo::increment_polling_attempts(&pool, track.id).await.unwrap(), 1);
    assert_eq!(TrackRepo::increment_polling_attempts(&pool, track.id).await.unwrap(), 2);
    assert_eq!(TrackRepo::increment_polling_attempts(&pool, track.id).await.unwrap(), 3);

    let reloaded = TrackRepo::find_by_id(&pool, track.id).await.unwrap().unwrap();
    let meta = TrackMetadata::from_value(&reloaded.metadata);
    assert_eq!(meta.polling_attempts, Some(3));
    assert!(meta.last_poll_at.is_some());
}

// ---------------------------------------------------------------------------
// Stuck scan & listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn find_stuck_returns_only_old_processing_tracks(pool: PgPool) {
    let fresh = TrackRepo::create(&pool, &new_track("fresh"), TrackStatus::Pending)
        .await
        .unwrap();
    TrackRepo::transition_status(&pool, fresh.id, TrackStatus::Pending, TrackStatus::Processing, None)
        .await
        .unwrap();

    let old = TrackRepo::create(&pool, &new_track("old"), TrackStatus::Pending)
        .await
        .unwrap();
    TrackRepo::transition_status(&pool, old.id, TrackStatus::Pending, TrackStatus::Processing, None)
        .await
        .unwrap();
    // Backdate the old track past the cutoff.
    sqlx::query("UPDATE tracks SET created_at = NOW() - INTERVAL '20 minutes' WHERE id = $1")
        .bind(old.id)
        .execute(&pool)
        .await
        .unwrap();

    let draft = TrackRepo::create(&pool, &new_track("draft"), TrackStatus::Draft)
        .await
        .unwrap();
    sqlx::query("UPDATE tracks SET created_at = NOW() - INTERVAL '20 minutes' WHERE id = $1")
        .bind(draft.id)
        .execute(&pool)
        .await
        .unwrap();

    let cutoff = chrono::Utc::now() - chrono::Duration::minutes(10);
    let stuck = TrackRepo::find_stuck(&pool, cutoff).await.unwrap();

    let ids: Vec<i64> = stuck.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![old.id]);
}

#[sqlx::test(migrations = "./migrations")]
async fn list_by_user_filters_by_owner_and_status(pool: PgPool) {
    let mine = new_track("mine");
    let user_id = mine.user_id;
    TrackRepo::create(&pool, &mine, TrackStatus::Draft).await.unwrap();
    TrackRepo::create(&pool, &new_track("other"), TrackStatus::Draft)
        .await
        .unwrap();

    let listed = TrackRepo::list_by_user(&pool, user_id, &TrackListQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "mine");

    let none = TrackRepo::list_by_user(
        &pool,
        user_id,
        &TrackListQuery {
            status_id: Some(TrackStatus::Completed.id()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(none.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn delete_cascades_to_versions(pool: PgPool) {
    let track = TrackRepo::create(&pool, &new_track("t"), TrackStatus::Pending)
        .await
        .unwrap();
    VersionRepo::attach(&pool, track.id, &version("https://cdn/a.mp3"))
        .await
        .unwrap();

    assert!(TrackRepo::delete(&pool, track.id).await.unwrap());

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM track_versions WHERE track_id = $1")
            .bind(track.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 0);
}
