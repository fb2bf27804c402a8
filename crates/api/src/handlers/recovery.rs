//! Handlers for on-demand stuck-track reconciliation.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tuneforge_core::types::DbId;
use tuneforge_pipeline::RecoveryOutcome;

use crate::error::AppResult;
use crate::middleware::identity::RequestIdentity;
use crate::response::DataResponse;
use crate::state::AppState;

/// One row of the scan report.
#[derive(Debug, Serialize)]
pub struct ScanResult {
    pub track_id: DbId,
    #[serde(flatten)]
    pub outcome: RecoveryOutcome,
}

/// POST /api/v1/recovery/scan
///
/// Find tracks stranded in `processing` past the actionable threshold
/// and reconcile each against its provider. Also runs periodically in
/// the background; this endpoint exists for support tooling and cron
/// triggers.
pub async fn scan(
    identity: RequestIdentity,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    identity.require_user()?;

    let outcomes = state.detector.run_scan().await?;
    let results: Vec<ScanResult> = outcomes
        .into_iter()
        .map(|(track_id, outcome)| ScanResult { track_id, outcome })
        .collect();

    tracing::info!(checked = results.len(), "Manual stuck-track scan complete");

    Ok(Json(DataResponse { data: results }))
}
