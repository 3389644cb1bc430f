//! # parley-store
//!
//! SQLite persistence for Parley conversations and messages.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the operations the
//! relay depends on: order-independent conversation lookup, message storage
//! with an activity bump, and the transactional clear used by the retention
//! sweep.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod retention;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use retention::ClearOutcome;
