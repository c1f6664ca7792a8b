//! Sheets API Server implementation
//!
//! HTTP REST API server using Axum. Exposes sheet registration, processing,
//! status, paged reconstruction, and access checks.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::config::Config;
use crate::orchestrator::{OrchestratorSettings, ProcessingOrchestrator};
use crate::permission::PermissionResolver;
use crate::store::{ContentStore, FileContentStore};

/// API Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub orchestrator: Arc<ProcessingOrchestrator>,
    pub resolver: PermissionResolver,
}

impl AppState {
    pub fn new(orchestrator: Arc<ProcessingOrchestrator>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            orchestrator,
            resolver: PermissionResolver::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        self.orchestrator.store()
    }
}

/// Build the router with all endpoints
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Sheets
        .route("/api/v1/sheets", post(handlers::register_sheet))
        .route("/api/v1/sheets/:id", get(handlers::get_sheet))
        .route("/api/v1/sheets/:id/process", post(handlers::process_sheet))
        .route("/api/v1/sheets/:id/status", get(handlers::sheet_status))
        .route(
            "/api/v1/sheets/:id/content",
            get(handlers::sheet_content).delete(handlers::clear_content),
        )
        .route("/api/v1/jobs/:id", get(handlers::job_status))
        .route("/api/v1/access", post(handlers::check_access))
        // State and middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: Config) -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_sheets=info,tower_http=info".into()),
        )
        .init();

    let store: Arc<dyn ContentStore> = Arc::new(FileContentStore::new(&config.storage.data_dir));
    let source = config.grid_source()?;
    let orchestrator = Arc::new(ProcessingOrchestrator::new(
        store,
        source,
        OrchestratorSettings::from(&config),
    ));
    let app = router(Arc::new(AppState::new(orchestrator)));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Sheets API Server starting on http://{}", addr);
    info!("   Data directory: {}", config.storage.data_dir.display());
    info!(
        "   Upstream: {}",
        config
            .upstream
            .base_url
            .as_deref()
            .unwrap_or("local files")
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Sheets API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
