//! Tally server binary

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tally_logging::TallySubscriberBuilder;
use tally_server::{ApiKey, AppState, Cli, ServerConfig, build_router, shutdown_signal};
use tally_storage::{TallyDb, TallyDbConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::resolve(&cli).context("loading configuration")?;

    let _log_guard = TallySubscriberBuilder::new()
        .with_config(config.log.clone())
        .init()?;

    if config.uses_default_api_key() {
        warn!("Using the built-in API key; set API_KEY before exposing this server");
    }

    let db = TallyDb::open(&TallyDbConfig::at(&config.db_path))
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;
    let state = AppState::new(
        Arc::new(db),
        ApiKey::new(&config.api_key),
        config.max_conflict_retries,
    );
    let app = build_router(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, db = %config.db_path.display(), "Tally server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}
