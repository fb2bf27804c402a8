use std::sync::Arc;

use tuneforge_core::rate_limit::RateLimiter;
use tuneforge_events::EventBus;
use tuneforge_pipeline::{GenerationOrchestrator, StuckJobDetector};
use tuneforge_providers::ProviderRegistry;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: tuneforge_db::DbPool,
    /// Server configuration (quotas, provider settings).
    pub config: Arc<ServerConfig>,
    /// Fixed-window request admission control.
    pub rate_limiter: Arc<RateLimiter>,
    /// Generation submission entry point.
    pub orchestrator: Arc<GenerationOrchestrator>,
    /// Stuck-track reconciliation and manual cancel/recover.
    pub detector: Arc<StuckJobDetector>,
    /// Provider adapter lookup (callback interpretation).
    pub registry: Arc<ProviderRegistry>,
    /// Centralized event bus for publishing platform events.
    pub event_bus: Arc<EventBus>,
}
