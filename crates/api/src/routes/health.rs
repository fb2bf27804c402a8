//! Health check route.

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

/// Routes mounted at `/`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /health
///
/// Liveness probe. Reports the service name and version; database
/// reachability is checked at startup and by the orchestration paths
/// themselves.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tuneforge-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
