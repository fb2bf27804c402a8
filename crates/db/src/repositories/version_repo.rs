//! Repository for the `track_versions` table.
//!
//! Version numbers are assigned here, never by callers: the next number
//! is `max(existing) + 1`, so the very first attach gets number 0 (the
//! canonical render) and is marked preferred. `uq_track_versions_number`
//! backstops concurrent attaches; `uq_track_versions_preferred` (a
//! partial unique index) makes a two-preferred state unrepresentable.

use sqlx::{PgConnection, PgPool};
use tuneforge_core::types::DbId;

use crate::models::version::{NewTrackVersion, TrackVersion};

/// Column list for `track_versions` queries.
const COLUMNS: &str = "\
    id, track_id, version_number, is_preferred, audio_url, video_url, \
    cover_url, duration_secs, provider_version_id, lyrics, metadata, \
    created_at";

/// Provides attach/list/preferred operations for track versions.
pub struct VersionRepo;

impl VersionRepo {
    /// Attach a new version to a track.
    ///
    /// Runs in its own transaction; when the new version becomes the
    /// preferred one (first attach), the track row's denormalized media
    /// pointers are updated in the same transaction.
    pub async fn attach(
        pool: &PgPool,
        track_id: DbId,
        input: &NewTrackVersion,
    ) -> Result<TrackVersion, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let version = Self::attach_with_conn(&mut *tx, track_id, input).await?;
        if version.is_preferred {
            Self::sync_track_pointers(&mut *tx, &version).await?;
        }
        tx.commit().await?;
        Ok(version)
    }

    /// Attach a version on an existing connection/transaction.
    ///
    /// Number assignment and insert are not atomic across writers; the
    /// unique constraint on (track_id, version_number) rejects the
    /// loser of a race, which surfaces as a 409 upstream.
    pub(crate) async fn attach_with_conn(
        conn: &mut PgConnection,
        track_id: DbId,
        input: &NewTrackVersion,
    ) -> Result<TrackVersion, sqlx::Error> {
        let (next_number,): (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version_number) + 1, 0) FROM track_versions WHERE track_id = $1",
        )
        .bind(track_id)
        .fetch_one(&mut *conn)
        .await?;

        // The original render (number 0) is the default playback target
        // until the user explicitly picks another version.
        let is_preferred = next_number == 0;

        // The metadata column is NOT NULL; normalize a stray JSON null.
        let metadata = if input.metadata.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            input.metadata.clone()
        };

        let query = format!(
            "INSERT INTO track_versions \
                 (track_id, version_number, is_preferred, audio_url, video_url, \
                  cover_url, duration_secs, provider_version_id, lyrics, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TrackVersion>(&query)
            .bind(track_id)
            .bind(next_number)
            .bind(is_preferred)
            .bind(&input.audio_url)
            .bind(&input.video_url)
            .bind(&input.cover_url)
            .bind(input.duration_secs)
            .bind(&input.provider_version_id)
            .bind(&input.lyrics)
            .bind(&metadata)
            .fetch_one(&mut *conn)
            .await
    }

    /// Mark one version as preferred, clearing the previous flag.
    ///
    /// Clear-then-set runs in a single transaction: no intermediate
    /// state with zero or two preferred versions is ever observable,
    /// and the partial unique index would reject one even if it were.
    /// Returns `None` when `version_id` does not belong to `track_id`.
    pub async fn set_preferred(
        pool: &PgPool,
        track_id: DbId,
        version_id: DbId,
    ) -> Result<Option<TrackVersion>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE track_versions SET is_preferred = FALSE \
             WHERE track_id = $1 AND is_preferred",
        )
        .bind(track_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "UPDATE track_versions SET is_preferred = TRUE \
             WHERE id = $1 AND track_id = $2 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, TrackVersion>(&query)
            .bind(version_id)
            .bind(track_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(version) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        Self::sync_track_pointers(&mut *tx, &version).await?;

        tx.commit().await?;
        Ok(Some(version))
    }

    /// List a track's versions in number order.
    pub async fn list_for_track(
        pool: &PgPool,
        track_id: DbId,
    ) -> Result<Vec<TrackVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM track_versions \
             WHERE track_id = $1 ORDER BY version_number ASC"
        );
        sqlx::query_as::<_, TrackVersion>(&query)
            .bind(track_id)
            .fetch_all(pool)
            .await
    }

    /// Find a version by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<TrackVersion>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM track_versions WHERE id = $1");
        sqlx::query_as::<_, TrackVersion>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The track's current preferred version, if any.
    pub async fn preferred_for_track(
        pool: &PgPool,
        track_id: DbId,
    ) -> Result<Option<TrackVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM track_versions \
             WHERE track_id = $1 AND is_preferred"
        );
        sqlx::query_as::<_, TrackVersion>(&query)
            .bind(track_id)
            .fetch_optional(pool)
            .await
    }

    /// Number of versions attached to a track.
    pub async fn count_for_track(pool: &PgPool, track_id: DbId) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM track_versions WHERE track_id = $1")
                .bind(track_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Copy a version's media references onto its parent track row
    /// (the denormalized "what the player should load" pointers).
    pub(crate) async fn sync_track_pointers(
        conn: &mut PgConnection,
        version: &TrackVersion,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tracks \
             SET audio_url = $2, video_url = $3, cover_url = $4, \
                 duration_secs = COALESCE($5, duration_secs), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(version.track_id)
        .bind(&version.audio_url)
        .bind(&version.video_url)
        .bind(&version.cover_url)
        .bind(version.duration_secs)
        .execute(conn)
        .await?;
        Ok(())
    }
}
