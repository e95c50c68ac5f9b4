//! HTTP interface.
//!
//! - `GET /stream?url=` resolves the page and relays its manifest
//! - `GET /resolve?url=` reports the manifest URL without relaying it
//! - `GET /health` liveness plus cache occupancy
//!
//! Handlers are thin: all pipeline logic lives in [`StreamResolver`].

pub mod error;
pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::resolve::StreamResolver;

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<StreamResolver>,
}

impl AppState {
    #[must_use]
    pub fn new(resolver: StreamResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(handlers::stream))
        .route("/resolve", get(handlers::resolve))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `config.server.bind` and serve until Ctrl-C.
pub async fn serve(config: &Config) -> Result<()> {
    let resolver = StreamResolver::from_config(config)?;
    info!(
        tiers = ?resolver.chain().names(),
        ttl = ?config.cache.ttl(),
        "Resolver ready"
    );

    let app = router(AppState::new(resolver));
    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
