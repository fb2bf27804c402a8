//! HTTP handlers.

pub mod callbacks;
pub mod recovery;
pub mod stems;
pub mod tracks;
pub mod versions;

use tuneforge_core::error::CoreError;
use tuneforge_core::rate_limit::RateLimitQuota;
use tuneforge_core::types::{DbId, UserId};
use tuneforge_db::models::track::Track;
use tuneforge_db::repositories::TrackRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::RequestIdentity;
use crate::state::AppState;

/// Check (and count) the caller against a quota. On rejection, the
/// resulting 429 carries a `Retry-After` computed from the window reset.
pub(crate) fn enforce_rate_limit(
    state: &AppState,
    identity: &RequestIdentity,
    quota: &RateLimitQuota,
) -> AppResult<()> {
    let decision = state
        .rate_limiter
        .check(&identity.rate_limit_identifier(), quota);

    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(chrono::Utc::now()),
        });
    }
    Ok(())
}

/// Fetch a track by ID and verify the caller owns it.
///
/// Returns `NotFound` if the track does not exist, `Forbidden` if the
/// caller is not the owner. `action` is used in the error message
/// (e.g. "view", "cancel").
pub(crate) async fn find_and_authorize_track(
    pool: &sqlx::PgPool,
    track_id: DbId,
    user_id: UserId,
    action: &str,
) -> AppResult<Track> {
    let track = TrackRepo::find_by_id(pool, track_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Track",
            id: track_id,
        }))?;

    if track.user_id != user_id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Cannot {action} another user's track"
        ))));
    }

    Ok(track)
}
