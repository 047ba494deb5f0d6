//! HTTP service
//!
//! Axum router over a shared [`QueryPipeline`], with permissive CORS,
//! request tracing and graceful shutdown on Ctrl+C or SIGTERM.

pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::errors::{RagError, Result};
use crate::pipeline::QueryPipeline;

pub use state::AppState;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/query", post(routes::query))
        .route("/api/query/stream", post(routes::query_stream))
        .route("/api/stats", get(routes::stats))
        .fallback(routes::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM
pub async fn serve(config: &ServerConfig, pipeline: QueryPipeline) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| RagError::Config(format!("Invalid listen address: {}", e)))?;

    let app = build_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ragquery listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
