//! Route definitions for stuck-track recovery.

use axum::routing::post;
use axum::Router;

use crate::handlers::recovery;
use crate::state::AppState;

/// Routes mounted at `/recovery`.
///
/// ```text
/// POST   /scan    -> scan
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/scan", post(recovery::scan))
}
