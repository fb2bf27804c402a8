//! Route definitions for provider webhooks.
//!
//! These endpoints are called by the providers, not by users; there is
//! no identity requirement, correlation happens by provider task id.

use axum::routing::post;
use axum::Router;

use crate::handlers::callbacks;
use crate::state::AppState;

/// Routes mounted at `/callbacks`.
///
/// ```text
/// POST   /suno      -> suno_callback
/// POST   /mureka    -> mureka_callback
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/suno", post(callbacks::suno_callback))
        .route("/mureka", post(callbacks::mureka_callback))
}
