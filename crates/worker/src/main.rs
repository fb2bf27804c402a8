//! Standalone reconciliation worker.
//!
//! Runs the stuck-track detector on an interval, independent of the
//! API server, so lost provider callbacks are recovered even when the
//! API process is down or being redeployed.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tuneforge_events::EventBus;
use tuneforge_pipeline::StuckJobDetector;
use tuneforge_providers::{MurekaAdapter, ProviderRegistry, SunoAdapter};

/// Default seconds between reconciliation sweeps.
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tuneforge_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = tuneforge_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tuneforge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection established");

    let interval_secs: u64 = std::env::var("STUCK_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS);

    // Providers come from the same env settings the API server uses.
    let http_client = reqwest::Client::builder()
        .timeout(tuneforge_providers::adapter::REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build reqwest HTTP client");

    let mut registry = ProviderRegistry::new();
    if let Some(suno) = tuneforge_providers::SunoConfig::from_env() {
        registry.register(Arc::new(SunoAdapter::with_client(http_client.clone(), suno)));
        tracing::info!("Suno adapter registered");
    }
    if let Some(mureka) = tuneforge_providers::MurekaConfig::from_env() {
        registry.register(Arc::new(MurekaAdapter::with_client(http_client, mureka)));
        tracing::info!("Mureka adapter registered");
    }

    let event_bus = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(tuneforge_events::EventPersistence::run(
        pool.clone(),
        event_bus.subscribe(),
    ));

    let detector = Arc::new(StuckJobDetector::new(
        pool,
        Arc::new(registry),
        Arc::clone(&event_bus),
    ));

    let cancel = tokio_util::sync::CancellationToken::new();
    let loop_cancel = cancel.clone();
    let detector_handle = tokio::spawn(async move {
        detector
            .run(Duration::from_secs(interval_secs), loop_cancel)
            .await;
    });

    tracing::info!(interval_secs, "Worker started");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl-C handler");
    tracing::info!("Received SIGINT, shutting down");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), detector_handle).await;

    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;

    tracing::info!("Worker shutdown complete");
}
