//! Repository for the `generation_jobs` ledger.
//!
//! Every submission to a provider gets exactly one row here. The
//! partial unique index `uq_generation_jobs_active` enforces the
//! one-active-job-per-(track, provider) invariant at the storage layer;
//! `uq_generation_jobs_idempotency_key` makes client retries land on
//! the existing row instead of creating a duplicate.

use sqlx::PgPool;
use tuneforge_core::types::DbId;

use crate::models::generation_job::GenerationJob;
use crate::models::status::GenerationJobStatus;

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    id, track_id, provider, idempotency_key, provider_task_id, status_id, \
    polling_attempts, last_error, submitted_at, created_at, updated_at";

/// Provides ledger operations for generation jobs.
pub struct GenerationJobRepo;

impl GenerationJobRepo {
    /// Insert a new active job. Fails with a unique violation when an
    /// active job already exists for this (track, provider) or when the
    /// idempotency key was already used.
    pub async fn create_active(
        pool: &PgPool,
        track_id: DbId,
        provider: &str,
        idempotency_key: &str,
    ) -> Result<GenerationJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_jobs (track_id, provider, idempotency_key, status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(track_id)
            .bind(provider)
            .bind(idempotency_key)
            .bind(GenerationJobStatus::Active.id())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its idempotency fingerprint, regardless of status.
    /// A retried client request must see the same job whether it is
    /// still active or already finished.
    pub async fn find_by_idempotency_key(
        pool: &PgPool,
        idempotency_key: &str,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE idempotency_key = $1");
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(idempotency_key)
            .fetch_optional(pool)
            .await
    }

    /// The in-flight job for a (track, provider), if any.
    pub async fn find_active_for_track(
        pool: &PgPool,
        track_id: DbId,
        provider: &str,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE track_id = $1 AND provider = $2 AND status_id = $3"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(track_id)
            .bind(provider)
            .bind(GenerationJobStatus::Active.id())
            .fetch_optional(pool)
            .await
    }

    /// Find the most recent job matching a provider task id (webhook
    /// correlation).
    pub async fn find_by_provider_task(
        pool: &PgPool,
        provider: &str,
        provider_task_id: &str,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE provider = $1 AND provider_task_id = $2 \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(provider)
            .bind(provider_task_id)
            .fetch_optional(pool)
            .await
    }

    /// Record the provider-assigned task id after a successful submit.
    pub async fn set_provider_task_id(
        pool: &PgPool,
        job_id: DbId,
        provider_task_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_jobs \
             SET provider_task_id = $2, submitted_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(provider_task_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark an active job completed. Returns `false` when the job had
    /// already left the active state.
    pub async fn complete(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        Self::finish(pool, job_id, GenerationJobStatus::Completed, None).await
    }

    /// Mark an active job failed, preserving the provider's reason
    /// verbatim. Returns `false` when the job had already left the
    /// active state.
    pub async fn fail(pool: &PgPool, job_id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        Self::finish(pool, job_id, GenerationJobStatus::Failed, Some(error)).await
    }

    /// Mark any active jobs for a (track, provider) as superseded.
    /// Used when a newer submission replaces an abandoned one.
    pub async fn supersede_active(
        pool: &PgPool,
        track_id: DbId,
        provider: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $3, updated_at = NOW() \
             WHERE track_id = $1 AND provider = $2 AND status_id = $4",
        )
        .bind(track_id)
        .bind(provider)
        .bind(GenerationJobStatus::Superseded.id())
        .bind(GenerationJobStatus::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Atomically bump the polling-attempt counter, returning the new
    /// count (surfaced to the UI as "attempt N/max").
    pub async fn increment_polling_attempts(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<i32, sqlx::Error> {
        let (attempts,): (i32,) = sqlx::query_as(
            "UPDATE generation_jobs \
             SET polling_attempts = polling_attempts + 1, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING polling_attempts",
        )
        .bind(job_id)
        .fetch_one(pool)
        .await?;
        Ok(attempts)
    }

    /// Record a diagnostic note on a job in any state (e.g. a late
    /// callback rejected by the status guard) without touching status.
    pub async fn record_note(pool: &PgPool, job_id: DbId, note: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_jobs SET last_error = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(note)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Guarded terminal-state write shared by [`complete`](Self::complete)
    /// and [`fail`](Self::fail).
    async fn finish(
        pool: &PgPool,
        job_id: DbId,
        to: GenerationJobStatus,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $2, last_error = COALESCE($3, last_error), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(job_id)
        .bind(to.id())
        .bind(error)
        .bind(GenerationJobStatus::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
