//! The chat message record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, UserId};

/// A direct message as held by the store.
///
/// `id` and `timestamp` are always assigned by the store. Editing rewrites the
/// record in place: same `id`, new `content`, new `timestamp`, `edited = true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub receiver_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited: bool,
}

impl Message {
    pub fn is_from(&self, user: &UserId) -> bool {
        self.sender_id == *user
    }
}

/// Client-side payload for an append; the store fills in id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub sender_id: UserId,
    pub sender_name: String,
    pub receiver_id: UserId,
    pub content: String,
}
