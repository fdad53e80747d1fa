//! HTTP API
//!
//! # Endpoints
//!
//! - `GET|POST /add?item=&count=&t=` - Count an event
//! - `GET /query?q=&start=&stop=&format=` - Per-window counts for a key
//! - `GET /topk?epoch=` - Ranked keys for a finalized window
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/v1/stats` - Service statistics

pub mod handlers;
pub mod types;

use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::engine::CounterService;
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Shared state for all handlers
pub struct AppState {
    /// Counter shared with the rotation driver
    pub service: Arc<CounterService>,
    /// Source of "now" for events submitted without a timestamp
    pub clock: Arc<dyn Clock>,
    /// Server settings (CORS origins)
    pub config: ServerConfig,
    /// Name of the rotation driver feeding the service
    pub driver: &'static str,
}

/// CORS layer allowing `origins`, or any origin when the list is empty
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/add", get(handlers::add).post(handlers::add))
        .route("/query", get(handlers::query))
        .route("/topk", get(handlers::topk))
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/stats", get(handlers::stats))
        .with_state(state.clone())
        .layer(cors_layer(&state.config.cors_allowed_origins))
}

/// Resolves on Ctrl+C or SIGTERM
///
/// If a handler cannot be installed that signal is ignored; with neither
/// available the future never resolves.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }

    info!("Stopping hokud");
}
