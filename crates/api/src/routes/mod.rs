//! Route definitions.

pub mod callbacks;
pub mod health;
pub mod recovery;
pub mod tracks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /tracks                                      list, create draft (GET, POST)
/// /tracks/generate                             submit generation (POST)
/// /tracks/{id}                                 get track (GET)
/// /tracks/{id}/cancel                          manual cancel (POST)
/// /tracks/{id}/recover                         on-demand recovery (POST)
/// /tracks/{id}/versions                        list, attach (GET, POST)
/// /tracks/{id}/versions/{vid}/preferred        set preferred (POST)
/// /tracks/{id}/stems                           list, request (GET, POST)
///
/// /callbacks/suno                              Suno webhook (POST)
/// /callbacks/mureka                            Mureka webhook (POST)
///
/// /recovery/scan                               reconcile stuck tracks (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/tracks", tracks::router())
        .nest("/callbacks", callbacks::router())
        .nest("/recovery", recovery::router())
}
