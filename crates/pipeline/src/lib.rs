//! TuneForge generation pipeline.
//!
//! Owns the track lifecycle between "user clicked generate" and "track
//! is playable":
//!
//! - [`orchestrator`] — submission: track resolution, idempotency,
//!   provider dispatch, the `-> processing` transition.
//! - [`apply`] — the single funnel through which every provider result
//!   (webhook callback or recovery poll) drives the status state
//!   machine.
//! - [`recovery`] — the stuck-job detector: scanning, provider
//!   re-polling, manual cancellation.

pub mod apply;
pub mod error;
pub mod orchestrator;
pub mod recovery;

pub use apply::{apply_provider_result, ApplyOutcome, ApplySource};
pub use error::PipelineError;
pub use orchestrator::{GenerationInput, GenerationOrchestrator, SubmissionReceipt};
pub use recovery::{CancelOutcome, RecoveryOutcome, StuckJobDetector, StuckLevel};
