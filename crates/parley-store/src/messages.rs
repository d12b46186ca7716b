//! CRUD operations on conversation logs (`chats/{key}/{messageId}`).

use rusqlite::params;

use parley_shared::paths::StorePath;
use parley_shared::{ConversationKey, Message, MessageId, UserId};

use crate::clock::from_millis;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::feeds::ChatTable;

const MESSAGE_COLUMNS: &str =
    "id, sender_id, sender_name, receiver_id, content, timestamp_ms, edited, conversation_key";

impl Database {
    pub fn insert_message(&self, key: &ConversationKey, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages
                (id, conversation_key, sender_id, sender_name, receiver_id, content, timestamp_ms, edited)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id.to_string(),
                key.as_str(),
                message.sender_id.as_str(),
                message.sender_name,
                message.receiver_id.as_str(),
                message.content,
                message.timestamp.timestamp_millis(),
                message.edited,
            ],
        )?;
        Ok(())
    }

    /// Overwrite every mutable field of an existing message. Returns `false`
    /// if no such message exists in that conversation.
    pub fn update_message(&self, key: &ConversationKey, message: &Message) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages
             SET sender_name = ?3, content = ?4, timestamp_ms = ?5, edited = ?6
             WHERE id = ?1 AND conversation_key = ?2",
            params![
                message.id.to_string(),
                key.as_str(),
                message.sender_name,
                message.content,
                message.timestamp.timestamp_millis(),
                message.edited,
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_message(&self, key: &ConversationKey, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE id = ?1 AND conversation_key = ?2"
                ),
                params![id.to_string(), key.as_str()],
                row_to_message,
            )
            .map(|(_, message)| message)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(StorePath::Message(key.clone(), id))
                }
                other => StoreError::Sqlite(other),
            })
    }

    /// Hard delete. Returns `true` if a row was removed.
    pub fn delete_message(&self, key: &ConversationKey, id: MessageId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE id = ?1 AND conversation_key = ?2",
            params![id.to_string(), key.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Every message of one conversation, in no particular order.
    pub fn messages_for_conversation(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_key = ?1"
        ))?;

        let rows = stmt.query_map(params![key.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.1);
        }
        Ok(messages)
    }

    /// The full message table grouped by conversation.
    pub fn all_messages(&self) -> Result<ChatTable> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages"))?;

        let rows = stmt.query_map([], row_to_message)?;

        let mut table = ChatTable::new();
        for row in rows {
            let (key, message) = row?;
            table
                .entry(ConversationKey::parse(&key)?)
                .or_default()
                .push(message);
        }
        Ok(table)
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn parse_user_id(idx: usize, raw: String) -> rusqlite::Result<UserId> {
    UserId::new(raw).map_err(|e| conversion_error(idx, e))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, Message)> {
    let id_str: String = row.get(0)?;
    let sender_id: String = row.get(1)?;
    let sender_name: String = row.get(2)?;
    let receiver_id: String = row.get(3)?;
    let content: String = row.get(4)?;
    let timestamp_ms: i64 = row.get(5)?;
    let edited: bool = row.get(6)?;
    let key: String = row.get(7)?;

    let id = MessageId::parse(&id_str).map_err(|e| conversion_error(0, e))?;

    Ok((
        key,
        Message {
            id,
            sender_id: parse_user_id(1, sender_id)?,
            sender_name,
            receiver_id: parse_user_id(3, receiver_id)?,
            content,
            timestamp: from_millis(timestamp_ms),
            edited,
        },
    ))
}
