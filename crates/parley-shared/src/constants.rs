/// Protocol version reported by the health endpoint
pub const PROTOCOL_VERSION: &str = "/parley/1.0.0";

/// Application name
pub const APP_NAME: &str = "Parley";

/// Maximum inbound WebSocket frame size in bytes (256 KiB)
pub const MAX_FRAME_BYTES: usize = 262_144;

/// Default per-connection outbound queue depth
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Default retention sweep period in seconds (1 hour)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default HTTP / WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Wire tag that binds a connection to an identity
pub const AUTH_TAG: &str = "auth";
