//! Strata HTTP gateway
//!
//! Exposes the hybrid router over HTTP:
//! - `POST /v1/ingest` classify content and write it to the vector and/or graph store
//! - `POST /v1/query` answer a question from either or both stores
//! - `GET /v1/health`, `GET /v1/ready` checks
//!
//! Prometheus metrics are served on a separate listener unless `metrics_port` is 0.

mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use strata_common::{
    config::{AppConfig, StorageBackend},
    db::DbPool,
    embeddings::create_embedder,
    metrics,
};
use strata_router::HybridRouter;
use strata_stores::{
    GraphStore, InMemoryGraphStore, InMemoryVectorStore, PgGraphStore, PgVectorStore, VectorStore,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub router: Arc<HybridRouter>,
    /// Present when the Postgres backends are in use
    pub db: Option<DbPool>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::load()?);
    init_tracing(&config);

    info!(
        service = %config.observability.service_name,
        "Starting Strata gateway v{}",
        strata_common::VERSION
    );

    // Metrics exporter
    match config.metrics_addr() {
        Some(metrics_addr) => {
            PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()?;
            info!(%metrics_addr, "Prometheus exporter listening");
        }
        None => info!("Metrics exporter disabled"),
    }
    metrics::register_metrics();

    let (vector, graph, db) = connect_stores(&config).await?;
    let embedder = create_embedder(&config.embedding)?;
    let router = HybridRouter::new(&config, embedder, vector, graph)?;

    if config.router.provision_on_startup {
        router.provision().await?;
    }

    let state = AppState {
        config: config.clone(),
        router: Arc::new(router),
        db: db.clone(),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = db {
        db.close().await;
    }
    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Build the configured store backends
async fn connect_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn VectorStore>, Arc<dyn GraphStore>, Option<DbPool>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory stores; contents are lost on restart");
            Ok((
                Arc::new(InMemoryVectorStore::new()),
                Arc::new(InMemoryGraphStore::new()),
                None,
            ))
        }
        StorageBackend::Postgres => {
            info!("Connecting to database...");
            let db = DbPool::new(&config.database).await?;
            Ok((
                Arc::new(PgVectorStore::new(db.pool().clone())),
                Arc::new(PgGraphStore::new(db.connection().clone())),
                Some(db),
            ))
        }
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // JSON envelope on top of the largest accepted text
    let body_limit = state.config.server.max_text_bytes.saturating_mul(2) + 16 * 1024;
    let timeout = state.config.request_timeout();

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/ingest", post(handlers::ingest::ingest))
        .route("/query", post(handlers::query::query));

    Router::new()
        .nest("/v1", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
