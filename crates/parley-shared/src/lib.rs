//! # parley-shared
//!
//! Types shared between the Parley relay server and its store: identifier
//! newtypes, the JSON wire protocol spoken over the relay WebSocket, and
//! the retention policy table with its classifier.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod retention;
pub mod types;

pub use error::ProtocolError;
pub use retention::RetentionPolicy;
pub use types::{ConversationId, UserId};
