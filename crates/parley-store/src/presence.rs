//! Presence flags (`connectionStatus/{userId}`).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use parley_shared::UserId;

use crate::clock::from_millis;
use crate::database::Database;
use crate::error::Result;

/// A user's liveness flag and the store time it last changed.
///
/// `changed_at` is recorded so a reader can judge how fresh an "online" flag
/// is; the store itself never expires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub online: bool,
    pub changed_at: DateTime<Utc>,
}

impl Database {
    pub fn set_presence(&self, user: &UserId, online: bool, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO connection_status (user_id, online, changed_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE
                SET online = excluded.online, changed_at_ms = excluded.changed_at_ms",
            params![user.as_str(), online, at.timestamp_millis()],
        )?;
        Ok(())
    }

    pub fn presence(&self, user: &UserId) -> Result<Option<Presence>> {
        let presence = self
            .conn()
            .query_row(
                "SELECT online, changed_at_ms FROM connection_status WHERE user_id = ?1",
                params![user.as_str()],
                |row| {
                    let online: bool = row.get(0)?;
                    let changed_at_ms: i64 = row.get(1)?;
                    Ok(Presence {
                        online,
                        changed_at: from_millis(changed_at_ms),
                    })
                },
            )
            .optional()?;
        Ok(presence)
    }
}
