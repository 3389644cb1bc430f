use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use parley_shared::{ConversationId, UserId};

use crate::conversations::{parse_timestamp, parse_uuid, row_to_conversation, CONVERSATION_COLUMNS};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

impl Database {
    /// Store a message and bump the conversation's activity clock.
    pub fn store_message(
        &mut self,
        conversation_id: ConversationId,
        sender: &UserId,
        content: &str,
    ) -> Result<Message> {
        self.store_message_at(conversation_id, sender, content, Utc::now())
    }

    /// Like [`Database::store_message`] with an explicit creation time.
    ///
    /// The insert and the `last_activity` bump commit together, so a
    /// concurrent retention clear sees either both or neither.
    pub fn store_message_at(
        &mut self,
        conversation_id: ConversationId,
        sender: &UserId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Message> {
        let tx = self.conn_mut().transaction()?;

        let conversation = tx
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![conversation_id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        if !conversation.involves(sender) {
            return Err(StoreError::NotParticipant(sender.to_string()));
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: sender.clone(),
            content: content.to_string(),
            created_at: at,
        };

        tx.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id.to_string(),
                conversation_id.to_string(),
                sender.as_str(),
                message.content,
                at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE conversations SET last_activity = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), conversation_id.to_string()],
        )?;

        tx.commit()?;
        Ok(message)
    }

    /// Messages of a conversation, newest first.
    pub fn get_messages(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, sender_id, content, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(
            params![conversation_id.to_string(), limit, offset],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn count_messages(&self, conversation_id: ConversationId) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete the whole history of a conversation. Returns how many
    /// messages were removed; zero is not an error.
    pub fn delete_messages(&self, conversation_id: ConversationId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id.to_string()],
        )?;
        Ok(affected)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let content: String = row.get(3)?;
    let ts_str: String = row.get(4)?;

    Ok(Message {
        id: parse_uuid(0, &id_str)?,
        conversation_id: ConversationId(parse_uuid(1, &conversation_str)?),
        sender_id: UserId(sender),
        content,
        created_at: parse_timestamp(4, &ts_str)?,
    })
}
