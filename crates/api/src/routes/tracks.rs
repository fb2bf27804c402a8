//! Route definitions for the `/tracks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{stems, tracks, versions};
use crate::state::AppState;

/// Routes mounted at `/tracks`.
///
/// ```text
/// GET    /                                  -> list_tracks
/// POST   /                                  -> create_track (draft)
/// POST   /generate                          -> generate
/// GET    /{id}                              -> get_track
/// POST   /{id}/cancel                       -> cancel_track
/// POST   /{id}/recover                      -> recover_track
/// GET    /{id}/versions                     -> list_versions
/// POST   /{id}/versions                     -> attach_version
/// POST   /{id}/versions/{vid}/preferred     -> set_preferred
/// GET    /{id}/stems                        -> list_stems
/// POST   /{id}/stems                        -> request_stem
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tracks::list_tracks).post(tracks::create_track))
        .route("/generate", post(tracks::generate))
        .route("/{id}", get(tracks::get_track))
        .route("/{id}/cancel", post(tracks::cancel_track))
        .route("/{id}/recover", post(tracks::recover_track))
        .route(
            "/{id}/versions",
            get(versions::list_versions).post(versions::attach_version),
        )
        .route(
            "/{id}/versions/{vid}/preferred",
            post(versions::set_preferred),
        )
        .route("/{id}/stems", get(stems::list_stems).post(stems::request_stem))
}
