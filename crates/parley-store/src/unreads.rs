//! Unread counters (`unreads/{key}/{userId}`).

use rusqlite::{params, OptionalExtension};

use parley_shared::paths::StorePath;
use parley_shared::{ConversationKey, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::feeds::UnreadTable;
use crate::messages::parse_user_id;

impl Database {
    /// Current counter value; a counter never written reads as zero.
    pub fn unread_count(&self, key: &ConversationKey, user: &UserId) -> Result<u32> {
        let count: Option<u32> = self
            .conn()
            .query_row(
                "SELECT count FROM unreads WHERE conversation_key = ?1 AND user_id = ?2",
                params![key.as_str(), user.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Unconditional write of `count`.
    pub fn set_unread(&self, key: &ConversationKey, user: &UserId, count: u32) -> Result<()> {
        self.conn().execute(
            "INSERT INTO unreads (conversation_key, user_id, count) VALUES (?1, ?2, ?3)
             ON CONFLICT (conversation_key, user_id) DO UPDATE SET count = excluded.count",
            params![key.as_str(), user.as_str(), count],
        )?;
        Ok(())
    }

    /// Atomically add one and return the new value. A missing counter is
    /// created at one; a counter already at `u32::MAX` is left alone and the
    /// increment fails.
    pub fn increment_unread(&self, key: &ConversationKey, user: &UserId) -> Result<u32> {
        let count: Option<u32> = self
            .conn()
            .query_row(
                "INSERT INTO unreads (conversation_key, user_id, count) VALUES (?1, ?2, 1)
                 ON CONFLICT (conversation_key, user_id) DO UPDATE SET count = count + 1
                    WHERE unreads.count < ?3
                 RETURNING count",
                params![key.as_str(), user.as_str(), u32::MAX],
                |row| row.get(0),
            )
            .optional()?;
        count.ok_or_else(|| StoreError::Invalid {
            path: StorePath::Unread(key.clone(), user.clone()),
            reason: "unread counter is saturated".into(),
        })
    }

    /// The whole counter table, grouped by conversation.
    pub fn all_unreads(&self) -> Result<UnreadTable> {
        let mut stmt = self
            .conn()
            .prepare("SELECT conversation_key, user_id, count FROM unreads")?;

        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let user: String = row.get(1)?;
            let count: u32 = row.get(2)?;
            Ok((key, parse_user_id(1, user)?, count))
        })?;

        let mut table = UnreadTable::new();
        for row in rows {
            let (key, user, count) = row?;
            table
                .entry(ConversationKey::parse(&key)?)
                .or_default()
                .insert(user, count);
        }
        Ok(table)
    }
}
