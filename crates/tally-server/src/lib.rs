//! HTTP surface for the Tally shared-state service
//!
//! | Route          | Auth        | Purpose                              |
//! |----------------|-------------|--------------------------------------|
//! | `GET /`        | none        | Service name, version and routes     |
//! | `GET /status`  | none        | Current counter and message          |
//! | `POST /update` | `X-API-Key` | Partial update, logged atomically    |
//! | `GET /logs`    | none        | Audit log, newest first, paginated   |
//!
//! Storage calls are synchronous redb transactions and run on the
//! blocking pool.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;

pub use auth::ApiKey;
pub use config::{Cli, ConfigError, ServerConfig};
pub use error::ApiError;
pub use handlers::AppState;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{MethodRouter, get, post};
use tokio::signal;
use tower_http::trace::TraceLayer;

use auth::require_api_key;
use handlers::{handle_logs, handle_root, handle_status, handle_update};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let guarded_update: MethodRouter<AppState> =
        post(handle_update).route_layer(from_fn_with_state(state.api_key.clone(), require_api_key));

    Router::new()
        .route("/", get(handle_root))
        .route("/status", get(handle_status))
        .route("/update", guarded_update)
        .route("/logs", get(handle_logs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve when the process receives SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
