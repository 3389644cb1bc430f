//! Transactional history clear used by the retention sweep.

use chrono::{DateTime, Utc};
use rusqlite::params;

use parley_shared::ConversationId;

use crate::conversations::{row_to_conversation, CONVERSATION_COLUMNS};
use crate::database::Database;
use crate::error::{Result, StoreError};

/// What [`Database::clear_conversation`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// History deleted and `last_cleared_at` stamped.
    Cleared { deleted: usize },
    /// Already cleared since the last message; nothing touched.
    AlreadyCleared,
    /// Not due at `now` any more (e.g. a message arrived after the
    /// conversation was listed); nothing touched.
    NotDue,
}

impl Database {
    /// Clear a conversation's history if, re-read inside the transaction,
    /// it is still due at `now` and has not been cleared for its current
    /// activity period.
    ///
    /// `last_activity` and the retention policy are left untouched.
    pub fn clear_conversation(
        &mut self,
        id: ConversationId,
        now: DateTime<Utc>,
    ) -> Result<ClearOutcome> {
        let tx = self.conn_mut().transaction()?;

        let conversation = tx
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        if !conversation.is_due(now) {
            return Ok(ClearOutcome::NotDue);
        }
        if conversation.cleared_since_activity() {
            return Ok(ClearOutcome::AlreadyCleared);
        }

        let deleted = tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute(
            "UPDATE conversations SET last_cleared_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), id.to_string()],
        )?;

        tx.commit()?;

        tracing::debug!(conversation = %id, deleted, "cleared conversation history");
        Ok(ClearOutcome::Cleared { deleted })
    }
}
