//! Periodic stuck-track reconciliation.
//!
//! Webhook delivery is best-effort, so the API server runs the
//! stuck-job detector on a fixed interval in addition to the standalone
//! worker binary — whichever instance reaches a stranded track first
//! recovers it; the other observes the guard rejection.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tuneforge_pipeline::StuckJobDetector;

/// Run the reconciliation loop until `cancel` is triggered.
pub async fn run(
    detector: Arc<StuckJobDetector>,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    detector
        .run(Duration::from_secs(interval_secs), cancel)
        .await;
}
