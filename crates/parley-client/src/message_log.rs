//! Conversation log adapter.
//!
//! Turns chat-level intents (send this text, edit that message) into the
//! complete records the store expects. Snapshots come back unordered; callers
//! sort them with [`timeline::order`](crate::timeline::order).

use tracing::{debug, info};

use parley_shared::{ConversationKey, CurrentUser, Message, MessageId, NewMessage, UserId};
use parley_store::{ChatTable, Result, Session, Subscription};

pub struct MessageLog<'a> {
    session: &'a Session,
}

impl<'a> MessageLog<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Append a new message from `from` to `to`. Id and timestamp are left
    /// to the store.
    pub async fn send(
        &self,
        key: &ConversationKey,
        from: &CurrentUser,
        to: &UserId,
        content: &str,
    ) -> Result<MessageId> {
        let id = self
            .session
            .append(
                key,
                NewMessage {
                    sender_id: from.id.clone(),
                    sender_name: from.name.clone(),
                    receiver_id: to.clone(),
                    content: content.to_string(),
                },
            )
            .await?;
        info!(conversation = %key, message = %id, "message sent");
        Ok(id)
    }

    /// Overwrite `original` with new content. The full record is sent; the
    /// store restamps it.
    pub async fn edit(
        &self,
        key: &ConversationKey,
        original: &Message,
        content: &str,
    ) -> Result<Message> {
        let record = Message {
            content: content.to_string(),
            edited: true,
            ..original.clone()
        };
        let updated = self.session.replace(key, &record).await?;
        info!(conversation = %key, message = %updated.id, "message edited");
        Ok(updated)
    }

    pub async fn remove(&self, key: &ConversationKey, id: MessageId) -> Result<bool> {
        let removed = self.session.remove(key, id).await?;
        debug!(conversation = %key, message = %id, removed, "message delete issued");
        Ok(removed)
    }

    pub fn subscribe(&self, key: &ConversationKey) -> Result<Subscription<Vec<Message>>> {
        self.session.subscribe_conversation(key)
    }

    pub fn subscribe_all(&self) -> Result<Subscription<ChatTable>> {
        self.session.subscribe_chats()
    }
}
