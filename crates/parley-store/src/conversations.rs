//! Operations on [`Conversation`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use parley_shared::{ConversationId, RetentionPolicy, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ordered_pair, Conversation};

pub(crate) const CONVERSATION_COLUMNS: &str =
    "id, user_low, user_high, retention_policy, last_activity, last_cleared_at, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Return the conversation between `a` and `b`, creating it on first
    /// contact. Argument order does not matter.
    pub fn find_or_create_conversation(&self, a: &UserId, b: &UserId) -> Result<Conversation> {
        if a.is_empty() || b.is_empty() {
            return Err(StoreError::InvalidParticipants(
                "participant identity is empty".to_string(),
            ));
        }
        if a == b {
            return Err(StoreError::InvalidParticipants(format!(
                "{a} cannot converse with themself"
            )));
        }

        let (low, high) = ordered_pair(a, b);
        let now = Utc::now().to_rfc3339();

        // The unique (user_low, user_high) index makes this race-free.
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO conversations
                 (id, user_low, user_high, retention_policy, last_activity, created_at)
             VALUES (?1, ?2, ?3, 'never', ?4, ?4)",
            params![ConversationId::new().to_string(), low.as_str(), high.as_str(), now],
        )?;
        if inserted > 0 {
            tracing::debug!(a = %low, b = %high, "created conversation");
        }

        self.find_conversation(a, b)?.ok_or(StoreError::NotFound)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Look up the conversation between two users, in either order.
    pub fn find_conversation(&self, a: &UserId, b: &UserId) -> Result<Option<Conversation>> {
        let (low, high) = ordered_pair(a, b);
        let found = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE user_low = ?1 AND user_high = ?2"
                ),
                params![low.as_str(), high.as_str()],
                row_to_conversation,
            )
            .optional()?;
        Ok(found)
    }

    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List every conversation, oldest first.
    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations ORDER BY created_at ASC"
        ))?;

        let rows = stmt.query_map([], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn set_retention_policy(&self, id: ConversationId, policy: RetentionPolicy) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE conversations SET retention_policy = ?1 WHERE id = ?2",
            params![policy.as_str(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Record when the conversation's history was last cleared.
    pub fn set_clear_timestamp(&self, id: ConversationId, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE conversations SET last_cleared_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_uuid(col: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(col: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Map a `rusqlite::Row` to a [`Conversation`].
pub(crate) fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let low: String = row.get(1)?;
    let high: String = row.get(2)?;
    let policy_str: String = row.get(3)?;
    let activity_str: String = row.get(4)?;
    let cleared_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(6)?;

    let retention_policy: RetentionPolicy = policy_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let last_cleared_at = cleared_str
        .map(|s| parse_timestamp(5, &s))
        .transpose()?;

    Ok(Conversation {
        id: ConversationId(parse_uuid(0, &id_str)?),
        participants: (UserId(low), UserId(high)),
        retention_policy,
        last_activity: parse_timestamp(4, &activity_str)?,
        last_cleared_at,
        created_at: parse_timestamp(6, &created_str)?,
    })
}
