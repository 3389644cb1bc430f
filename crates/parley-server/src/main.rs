//! # parley-server
//!
//! Real-time signaling relay for Parley.
//!
//! This binary provides:
//! - **Identity registry** mapping each authenticated user to its one live
//!   WebSocket connection (last registration wins)
//! - **Signaling relay** forwarding offer/answer/ICE and call lifecycle
//!   messages to exactly one target, tagged with the verified sender
//! - **Notification broadcaster** pushing every stored message to all
//!   connected clients
//! - **Retention sweep** clearing conversations whose history has been idle
//!   past their retention policy
//! - **REST API** (axum) for health, stats, and the message store hook

mod api;
mod broadcast;
mod config;
mod connection;
mod error;
mod registry;
mod relay;
mod retention;
mod session;
mod ws;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_shared::constants::APP_NAME;
use parley_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::retention::RetentionExecutor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting {} relay server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Arc::new(Mutex::new(Database::open_at(&config.database_path)?));
    let app_state = AppState::new(config.clone(), db.clone());

    // -----------------------------------------------------------------------
    // 4. Spawn the retention sweep
    // -----------------------------------------------------------------------
    let sweeper = retention::spawn_sweeper(RetentionExecutor::new(db), config.sweep_interval);
    info!(
        every_secs = config.sweep_interval.as_secs(),
        "Retention sweep scheduled"
    );

    // -----------------------------------------------------------------------
    // 5. Run the HTTP + WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "HTTP server failed");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    sweeper.abort();
    result
}
