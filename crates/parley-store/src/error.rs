use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A conversation needs two distinct, non-empty participants.
    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),

    /// The sender of a message is not one of the conversation's participants.
    #[error("{0} is not a participant of this conversation")]
    NotParticipant(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
