use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tuneforge_api::config::ServerConfig;
use tuneforge_api::{background, routes, state};
use tuneforge_core::rate_limit::RateLimiter;
use tuneforge_events::EventBus;
use tuneforge_pipeline::{GenerationOrchestrator, StuckJobDetector};
use tuneforge_providers::{MurekaAdapter, ProviderRegistry, SunoAdapter};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tuneforge_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = tuneforge_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    tuneforge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    tuneforge_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Provider registry ---
    // One pooled HTTP client shared across adapters.
    let http_client = reqwest::Client::builder()
        .timeout(tuneforge_providers::adapter::REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build reqwest HTTP client");

    let mut registry = ProviderRegistry::new();
    if let Some(suno) = config.providers.suno.clone() {
        registry.register(Arc::new(SunoAdapter::with_client(
            http_client.clone(),
            suno,
        )));
        tracing::info!("Suno adapter registered");
    }
    if let Some(mureka) = config.providers.mureka.clone() {
        registry.register(Arc::new(MurekaAdapter::with_client(
            http_client.clone(),
            mureka,
        )));
        tracing::info!("Mureka adapter registered");
    }
    let registry = Arc::new(registry);

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // Spawn event persistence (writes all events to the database).
    let persistence_handle = tokio::spawn(tuneforge_events::EventPersistence::run(
        pool.clone(),
        event_bus.subscribe(),
    ));
    tracing::info!("Event bus created, persistence started");

    // --- Rate limiter ---
    let rate_limiter = Arc::new(RateLimiter::new());
    let sweep_cancel = tokio_util::sync::CancellationToken::new();
    let sweep_handle = RateLimiter::start_sweep(Arc::clone(&rate_limiter), sweep_cancel.clone());

    // --- Pipeline services ---
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        pool.clone(),
        Arc::clone(&registry),
        Arc::clone(&event_bus),
    ));
    let detector = Arc::new(StuckJobDetector::new(
        pool.clone(),
        Arc::clone(&registry),
        Arc::clone(&event_bus),
    ));

    // Spawn the periodic stuck-track reconciliation sweep.
    let stuck_cancel = tokio_util::sync::CancellationToken::new();
    let stuck_handle = tokio::spawn(background::stuck_tracks::run(
        Arc::clone(&detector),
        config.stuck_scan_interval_secs,
        stuck_cancel.clone(),
    ));
    tracing::info!(
        interval_secs = config.stuck_scan_interval_secs,
        "Stuck-track sweep started"
    );

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        rate_limiter: Arc::clone(&rate_limiter),
        orchestrator: Arc::clone(&orchestrator),
        detector: Arc::clone(&detector),
        registry: Arc::clone(&registry),
        event_bus: Arc::clone(&event_bus),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the reconciliation sweep first (it may have in-flight polls).
    stuck_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), stuck_handle).await;
    tracing::info!("Stuck-track sweep stopped");

    // Stop the rate limiter eviction task.
    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep_handle).await;

    // Drop every remaining bus handle to close the broadcast channel.
    // This signals persistence to shut down.
    drop(orchestrator);
    drop(detector);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    tracing::info!("Event services shut down");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
