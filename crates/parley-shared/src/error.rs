use thiserror::Error;

use crate::protocol::SignalKind;

/// Reasons an inbound frame is dropped at the transport boundary.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Unrecognized message type: {0}")]
    UnknownType(String),

    #[error("Missing target for {0} message")]
    MissingTarget(SignalKind),

    #[error("Auth message carries no user identity")]
    MissingIdentity,

    #[error("Invalid retention policy: {0}")]
    InvalidRetentionPolicy(String),
}
