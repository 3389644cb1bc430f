//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_OUTBOUND_BUFFER, DEFAULT_SWEEP_INTERVAL_SECS, MAX_FRAME_BYTES,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API and the relay WebSocket.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./parley.db`
    pub database_path: PathBuf,

    /// Period of the retention sweep.
    /// Env: `SWEEP_INTERVAL_SECS`
    /// Default: 1 hour
    pub sweep_interval: Duration,

    /// Frames queued per connection before further frames are dropped.
    /// Env: `OUTBOUND_BUFFER`
    /// Default: `64`
    pub outbound_buffer: usize,

    /// Tell senders when their signal target is unreachable.
    /// Env: `NOTIFY_UNREACHABLE` (true/false)
    /// Default: `false`
    pub notify_unreachable: bool,

    /// Inbound frames above this size are dropped.
    /// Env: `MAX_FRAME_BYTES`
    /// Default: 256 KiB
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./parley.db"),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            notify_unreachable: false,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("SWEEP_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.sweep_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid SWEEP_INTERVAL_SECS, using default"),
            }
        }

        if let Some(val) = lookup("OUTBOUND_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.outbound_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid OUTBOUND_BUFFER, using default"),
            }
        }

        if let Some(val) = lookup("NOTIFY_UNREACHABLE") {
            config.notify_unreachable = val == "true" || val == "1";
        }

        if let Some(val) = lookup("MAX_FRAME_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_frame_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_FRAME_BYTES, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
