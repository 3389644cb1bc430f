//! v001 -- Initial schema creation.
//!
//! Creates the `conversations` and `messages` tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Conversations (one per unordered pair of users)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user_low         TEXT NOT NULL,               -- lexically smaller participant
    user_high        TEXT NOT NULL,               -- lexically larger participant
    retention_policy TEXT NOT NULL DEFAULT 'never'
        CHECK (retention_policy IN ('never', '24h', '1week', '30days')),
    last_activity    TEXT NOT NULL,               -- RFC-3339
    last_cleared_at  TEXT,                        -- RFC-3339, nullable
    created_at       TEXT NOT NULL,

    CHECK (user_low < user_high),
    UNIQUE (user_low, user_high)
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    conversation_id TEXT NOT NULL,                -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL,                -- RFC-3339

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
