//! Repository for the `tracks` table.
//!
//! All status writes go through conditional updates (`WHERE status_id =
//! $from`) so a late callback or a concurrent recovery poll can never
//! resurrect a terminal track. Uses `TrackStatus` from `models::status`
//! for every transition — no magic numbers.

use sqlx::PgPool;
use tuneforge_core::types::{DbId, Timestamp, UserId};

use crate::models::status::TrackStatus;
use crate::models::track::{CreateTrack, Track, TrackListQuery};
use crate::models::version::{NewTrackVersion, TrackVersion};
use crate::repositories::version_repo::VersionRepo;

/// Column list for `tracks` queries.
const COLUMNS: &str = "\
    id, user_id, title, prompt, lyrics, style_tags, genre, mood, \
    has_vocals, provider, status_id, model_version, error_message, \
    duration_secs, audio_url, video_url, cover_url, metadata, \
    created_at, updated_at";

/// Maximum page size for track listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for track listing.
const DEFAULT_LIMIT: i64 = 50;

/// Batch size for stuck-track scans.
const STUCK_SCAN_LIMIT: i64 = 20;

/// Provides CRUD and lifecycle operations for tracks.
pub struct TrackRepo;

impl TrackRepo {
    /// Insert a new track row in the given initial status
    /// (`Pending` for submissions, `Draft` for manual drafts).
    pub async fn create(
        pool: &PgPool,
        input: &CreateTrack,
        status: TrackStatus,
    ) -> Result<Track, sqlx::Error> {
        let query = format!(
            "INSERT INTO tracks \
                 (user_id, title, prompt, lyrics, style_tags, genre, mood, \
                  has_vocals, provider, status_id, model_version, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Track>(&query)
            .bind(input.user_id)
            .bind(&input.title)
            .bind(&input.prompt)
            .bind(&input.lyrics)
            .bind(&input.style_tags)
            .bind(&input.genre)
            .bind(&input.mood)
            .bind(input.has_vocals)
            .bind(&input.provider)
            .bind(status.id())
            .bind(&input.model_version)
            .bind(&input.metadata)
            .fetch_one(pool)
            .await
    }

    /// Find a track by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Track>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tracks WHERE id = $1");
        sqlx::query_as::<_, Track>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's tracks with optional status filter and pagination.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: UserId,
        params: &TrackListQuery,
    ) -> Result<Vec<Track>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let query = if params.status_id.is_some() {
            format!(
                "SELECT {COLUMNS} FROM tracks \
                 WHERE user_id = $1 AND status_id = $4 \
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
            )
        } else {
            format!(
                "SELECT {COLUMNS} FROM tracks \
                 WHERE user_id = $1 \
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
            )
        };

        let mut q = sqlx::query_as::<_, Track>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset);
        if let Some(status_id) = params.status_id {
            q = q.bind(status_id);
        }
        q.fetch_all(pool).await
    }

    /// Apply a guarded status transition.
    ///
    /// The update only matches when the row is still in `from`, which
    /// serializes racing writers (webhook vs. recovery poll vs. cancel):
    /// exactly one of them observes `true`, the rest observe `false`.
    /// Callers must have validated `from.can_transition_to(to)`.
    pub async fn transition_status(
        pool: &PgPool,
        track_id: DbId,
        from: TrackStatus,
        to: TrackStatus,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tracks \
             SET status_id = $3, error_message = COALESCE($4, error_message), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(track_id)
        .bind(from.id())
        .bind(to.id())
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Complete a track and attach its rendered versions atomically.
    ///
    /// The status guard (`processing -> completed`) and the version
    /// inserts run in one transaction, so a track is never observable
    /// as `completed` with zero versions, and a cancelled track cannot
    /// be completed by a late result. Returns `None` when the guard
    /// rejects (the track already left `processing`).
    pub async fn complete_with_versions(
        pool: &PgPool,
        track_id: DbId,
        versions: &[NewTrackVersion],
    ) -> Result<Option<Vec<TrackVersion>>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let guard = sqlx::query(
            "UPDATE tracks \
             SET status_id = $3, error_message = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(track_id)
        .bind(TrackStatus::Processing.id())
        .bind(TrackStatus::Completed.id())
        .execute(&mut *tx)
        .await?;

        if guard.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let mut attached = Vec::with_capacity(versions.len());
        for input in versions {
            let version = VersionRepo::attach_with_conn(&mut *tx, track_id, input).await?;
            attached.push(version);
        }

        // Keep the track row's denormalized media pointers in sync with
        // the preferred version.
        if let Some(preferred) = attached.iter().find(|v| v.is_preferred) {
            VersionRepo::sync_track_pointers(&mut *tx, preferred).await?;
        }

        tx.commit().await?;
        Ok(Some(attached))
    }

    /// Merge a JSON patch into the metadata bag (`metadata || $patch`).
    /// The merge happens inside Postgres, so concurrent patches to
    /// different keys do not lose updates.
    pub async fn merge_metadata(
        pool: &PgPool,
        track_id: DbId,
        patch: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tracks SET metadata = metadata || $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(track_id)
        .bind(patch)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Atomically bump `metadata.polling_attempts`, returning the new
    /// count. Also stamps `metadata.last_poll_at`.
    pub async fn increment_polling_attempts(
        pool: &PgPool,
        track_id: DbId,
    ) -> Result<i32, sqlx::Error> {
        let (attempts,): (i32,) = sqlx::query_as(
            "UPDATE tracks \
             SET metadata = jsonb_set( \
                     jsonb_set( \
                         metadata, \
                         '{polling_attempts}', \
                         to_jsonb(COALESCE((metadata->>'polling_attempts')::int, 0) + 1) \
                     ), \
                     '{last_poll_at}', \
                     to_jsonb(NOW()) \
                 ), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING (metadata->>'polling_attempts')::int",
        )
        .bind(track_id)
        .fetch_one(pool)
        .await?;
        Ok(attempts)
    }

    /// Find `processing` tracks created before `older_than`, oldest
    /// first, capped at the scan batch size. These are the stuck-job
    /// recovery candidates.
    pub async fn find_stuck(
        pool: &PgPool,
        older_than: Timestamp,
    ) -> Result<Vec<Track>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tracks \
             WHERE status_id = $1 AND created_at < $2 \
             ORDER BY created_at ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Track>(&query)
            .bind(TrackStatus::Processing.id())
            .bind(older_than)
            .bind(STUCK_SCAN_LIMIT)
            .fetch_all(pool)
            .await
    }

    /// Delete a track (versions and stems cascade).
    pub async fn delete(pool: &PgPool, track_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tracks WHERE id = $1")
            .bind(track_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
