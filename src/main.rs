//! Riskfuse - threat intelligence aggregation and risk-fusion service
//!
//! Given an observable (ip, url, domain, email, hash), the service fans out
//! to an ML scoring backend and a set of independent threat-intel connectors,
//! fuses their signals into one deterministic risk score, and persists the
//! result as a queryable, mutable-status threat record.
//!
//! # Architecture
//!
//! ```text
//! POST /analyze ──► Orchestrator ──► (ML Scorer ‖ Connectors) ──► Fusion
//!                        │                                          │
//!                        ▼                                          ▼
//!                  Redis cache ◄──────────────────────────── PostgreSQL
//! ```

mod cache;
mod config;
mod connectors;
mod db;
mod error;
mod fusion;
mod handlers;
mod models;
mod orchestrator;
mod scorer;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "riskfuse=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("Riskfuse server starting...");
    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));

    // Initialize database pool
    let pool = db::create_pool(&config.database_url).await
        .expect("Failed to create database pool");

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await
        .expect("Failed to run migrations");

    // Bring up the threat-record cache (degrades to disabled on failure)
    let cache = cache::ThreatCache::connect(&config.redis_url, config.cache_ttl_secs).await;

    // Shared outbound HTTP client for connectors, bounded per-request
    let connector_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.connector_timeout_secs))
        .build()
        .expect("Failed to build HTTP client");

    let connectors = Arc::new(connectors::build_registry(&config, &connector_http));
    let scorer = scorer::MlScorerClient::new(&config.ml_scorer_url, config.scorer_timeout_secs);

    // Build application state
    let state = AppState {
        pool,
        cache,
        scorer,
        connectors,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub cache: cache::ThreatCache,
    pub scorer: scorer::MlScorerClient,
    pub connectors: Arc<Vec<Arc<dyn connectors::SignalConnector>>>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))

        // Analysis
        .route("/api/v1/analyze", post(handlers::threats::analyze))
        .route("/api/v1/analyze/batch", post(handlers::threats::analyze_batch))

        // Threat records
        .route("/api/v1/threats", get(handlers::threats::list))
        .route("/api/v1/threats/:id", get(handlers::threats::get))
        .route("/api/v1/threats/:id/status", put(handlers::threats::update_status))

        // Aggregates
        .route("/api/v1/stats", get(handlers::threats::stats))

        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
