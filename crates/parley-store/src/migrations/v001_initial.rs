//! v001 -- Initial schema creation.
//!
//! Creates the three trees of the chat store: `messages` (one row per
//! `chats/{key}/{messageId}`), `unreads` and `connection_status`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages: chats/{conversation_key}/{id}
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4, store-assigned
    conversation_key TEXT NOT NULL,               -- min(a,b) || '_' || max(a,b)
    sender_id        TEXT NOT NULL,
    sender_name      TEXT NOT NULL,
    receiver_id      TEXT NOT NULL,
    content          TEXT NOT NULL,
    timestamp_ms     INTEGER NOT NULL,            -- store clock, unix millis
    edited           INTEGER NOT NULL DEFAULT 0   -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages(conversation_key);

-- ----------------------------------------------------------------
-- Unread counters: unreads/{conversation_key}/{user_id}
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS unreads (
    conversation_key TEXT NOT NULL,
    user_id          TEXT NOT NULL,
    count            INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),

    PRIMARY KEY (conversation_key, user_id)
);

-- ----------------------------------------------------------------
-- Presence: connectionStatus/{user_id}
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS connection_status (
    user_id       TEXT PRIMARY KEY NOT NULL,
    online        INTEGER NOT NULL,               -- boolean 0/1
    changed_at_ms INTEGER NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
