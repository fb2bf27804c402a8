//! TuneForge event bus and change-notification infrastructure.
//!
//! The repository layer publishes a [`PlatformEvent`] for every track
//! lifecycle change; UI push delivery is an external collaborator that
//! subscribes to the same bus. Delivery is at-most-once/best-effort —
//! the stuck-job detector exists precisely because consumers must
//! reconcile by polling when a notification is missed.
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`] — the canonical domain event envelope.
//! - [`EventPersistence`] — background service that durably writes
//!   every event to the `events` table.

pub mod bus;
pub mod persistence;

pub use bus::{EventBus, PlatformEvent};
pub use persistence::EventPersistence;

/// Event type names published by the orchestration core.
pub mod names {
    pub const TRACK_CREATED: &str = "track.created";
    pub const TRACK_PROCESSING: &str = "track.processing";
    pub const TRACK_COMPLETED: &str = "track.completed";
    pub const TRACK_FAILED: &str = "track.failed";
    pub const TRACK_CANCELLED: &str = "track.cancelled";
    pub const TRACK_VERSION_ADDED: &str = "track.version_added";
    pub const TRACK_PREFERRED_CHANGED: &str = "track.preferred_changed";
    pub const TRACK_AWAITING_INPUT: &str = "track.awaiting_input";
    pub const TRACK_RECOVERED: &str = "track.recovered";
    pub const STEM_REQUESTED: &str = "stem.requested";
    pub const STEM_COMPLETED: &str = "stem.completed";
    pub const STEM_FAILED: &str = "stem.failed";
}
