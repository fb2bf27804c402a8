//! Repository for the `track_stems` table.

use sqlx::PgPool;
use tuneforge_core::types::DbId;

use crate::models::status::StemStatus;
use crate::models::stem::{CreateStem, TrackStem};

/// Column list for `track_stems` queries.
const COLUMNS: &str = "\
    id, track_id, version_id, stem_type, separation_mode, audio_url, \
    provider_task_id, status_id, error_message, created_at, updated_at";

/// Provides CRUD and lifecycle operations for stems.
pub struct StemRepo;

impl StemRepo {
    /// Create a pending stem-separation request.
    pub async fn create(
        pool: &PgPool,
        track_id: DbId,
        input: &CreateStem,
    ) -> Result<TrackStem, sqlx::Error> {
        let query = format!(
            "INSERT INTO track_stems \
                 (track_id, version_id, stem_type, separation_mode, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TrackStem>(&query)
            .bind(track_id)
            .bind(input.version_id)
            .bind(&input.stem_type)
            .bind(&input.separation_mode)
            .bind(StemStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Record the provider task id and move to `processing`.
    pub async fn mark_processing(
        pool: &PgPool,
        stem_id: DbId,
        provider_task_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE track_stems \
             SET provider_task_id = $2, status_id = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(stem_id)
        .bind(provider_task_id)
        .bind(StemStatus::Processing.id())
        .bind(StemStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the extracted audio and move to `completed`. Guarded the
    /// same way as track transitions: a stem that already failed (or
    /// finished) is not overwritten by a late result.
    pub async fn complete(
        pool: &PgPool,
        stem_id: DbId,
        audio_url: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE track_stems \
             SET audio_url = $2, status_id = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(stem_id)
        .bind(audio_url)
        .bind(StemStatus::Completed.id())
        .bind(StemStatus::Pending.id())
        .bind(StemStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a non-terminal stem to `failed`, preserving the reason.
    pub async fn fail(pool: &PgPool, stem_id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE track_stems \
             SET status_id = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(stem_id)
        .bind(StemStatus::Failed.id())
        .bind(error)
        .bind(StemStatus::Pending.id())
        .bind(StemStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a stem by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TrackStem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM track_stems WHERE id = $1");
        sqlx::query_as::<_, TrackStem>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a stem by its provider task id (webhook correlation).
    pub async fn find_by_provider_task(
        pool: &PgPool,
        provider_task_id: &str,
    ) -> Result<Option<TrackStem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM track_stems \
             WHERE provider_task_id = $1 \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, TrackStem>(&query)
            .bind(provider_task_id)
            .fetch_optional(pool)
            .await
    }

    /// List a track's stems, newest first.
    pub async fn list_for_track(
        pool: &PgPool,
        track_id: DbId,
    ) -> Result<Vec<TrackStem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM track_stems \
             WHERE track_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, TrackStem>(&query)
            .bind(track_id)
            .fetch_all(pool)
            .await
    }
}
