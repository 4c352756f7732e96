use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use triad_store::RunArchive;

use crate::handlers;
use crate::orchestrator::RunOrchestrator;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            keep_alive_secs: 15,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<dyn RunOrchestrator>,
    pub archive: Arc<dyn RunArchive>,
    pub keep_alive_secs: u64,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/run", get(handlers::run_get))
        .route("/runs", get(handlers::list_runs).post(handlers::run_post))
        .route("/runs/{run_id}/messages", get(handlers::run_messages))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    orchestrator: Arc<dyn RunOrchestrator>,
    archive: Arc<dyn RunArchive>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        archive,
        keep_alive_secs: config.keep_alive_secs.max(1),
    };

    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "triad server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        orchestrator,
        shutdown,
        server,
    })
}

/// Handle returned by `start()`. Keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    orchestrator: Arc<dyn RunOrchestrator>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Cancel in-flight runs and wait for open connections to drain.
    pub async fn shutdown(self) {
        let aborted = self.orchestrator.abort_all();
        tracing::info!(aborted, "shutting down");
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
    }
}
