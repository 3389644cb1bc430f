//! Domain model structs persisted in the SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_shared::protocol::MessageEvent;
use parley_shared::retention::{self, RetentionPolicy};
use parley_shared::{ConversationId, UserId};

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A one-to-one conversation between two users.
///
/// Participants are kept in lexical order so that the pair is unordered:
/// `(a, b)` and `(b, a)` name the same record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: (UserId, UserId),
    pub retention_policy: RetentionPolicy,
    /// Bumped on every stored message.
    pub last_activity: DateTime<Utc>,
    /// Set by the retention sweep; never touches `last_activity`.
    pub last_cleared_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user: &UserId) -> bool {
        self.participants.0 == *user || self.participants.1 == *user
    }

    /// Whether the retention policy says this conversation is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        retention::is_due(self.retention_policy, self.last_activity, now)
    }

    /// Whether the current activity period has already been cleared.
    pub fn cleared_since_activity(&self) -> bool {
        self.last_cleared_at
            .is_some_and(|cleared| cleared >= self.last_activity)
    }
}

/// Order a pair of participants the way the `conversations` table stores it.
pub fn ordered_pair(a: &UserId, b: &UserId) -> (UserId, UserId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single stored chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageEvent {
    fn from(m: Message) -> Self {
        MessageEvent {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            content: m.content,
            created_at: m.created_at,
        }
    }
}
