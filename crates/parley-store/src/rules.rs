//! Access rules evaluated for every write, against the identity the writing
//! session authenticated as.
//!
//! Clients also hide edit/delete affordances for messages they do not own,
//! but that is cosmetic; these checks are what actually stop a writer from
//! touching another user's messages, counters or presence.

use parley_shared::paths::StorePath;
use parley_shared::{ConversationKey, Message, NewMessage, UserId};

use crate::error::{Result, StoreError};

fn deny(path: StorePath, reason: impl Into<String>) -> StoreError {
    StoreError::PermissionDenied {
        path,
        reason: reason.into(),
    }
}

fn invalid(path: StorePath, reason: impl Into<String>) -> StoreError {
    StoreError::Invalid {
        path,
        reason: reason.into(),
    }
}

pub(crate) fn check_append(
    writer: &UserId,
    key: &ConversationKey,
    message: &NewMessage,
) -> Result<()> {
    let path = StorePath::Conversation(key.clone());
    if message.sender_id != *writer {
        return Err(deny(path, format!("{writer} cannot send as {}", message.sender_id)));
    }
    if ConversationKey::between(&message.sender_id, &message.receiver_id) != *key {
        return Err(invalid(path, "sender and receiver do not match the conversation"));
    }
    check_content(path, &message.content)
}

pub(crate) fn check_replace(
    writer: &UserId,
    key: &ConversationKey,
    stored: &Message,
    incoming: &Message,
) -> Result<()> {
    let path = StorePath::Message(key.clone(), stored.id);
    if stored.sender_id != *writer {
        return Err(deny(path, format!("{writer} does not own this message")));
    }
    if incoming.sender_id != stored.sender_id || incoming.receiver_id != stored.receiver_id {
        return Err(invalid(path, "sender and receiver are immutable"));
    }
    check_content(path, &incoming.content)
}

pub(crate) fn check_remove(writer: &UserId, key: &ConversationKey, stored: &Message) -> Result<()> {
    if stored.sender_id != *writer {
        return Err(deny(
            StorePath::Message(key.clone(), stored.id),
            format!("{writer} does not own this message"),
        ));
    }
    Ok(())
}

/// Either participant may touch either participant's counter: senders bump
/// the receiver's, recipients zero their own.
pub(crate) fn check_unread(
    writer: &UserId,
    key: &ConversationKey,
    recipient: &UserId,
) -> Result<()> {
    let path = StorePath::Unread(key.clone(), recipient.clone());
    if !key.involves(writer) {
        return Err(deny(path, format!("{writer} is not a participant")));
    }
    if !key.involves(recipient) {
        return Err(invalid(path, format!("{recipient} is not a participant")));
    }
    Ok(())
}

pub(crate) fn check_presence(writer: &UserId, user: &UserId) -> Result<()> {
    if writer != user {
        return Err(deny(
            StorePath::ConnectionStatus(user.clone()),
            format!("{writer} cannot set presence for {user}"),
        ));
    }
    Ok(())
}

fn check_content(path: StorePath, content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(invalid(path, "content is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_shared::MessageId;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn new_message(from: &str, to: &str) -> NewMessage {
        NewMessage {
            sender_id: uid(from),
            sender_name: from.into(),
            receiver_id: uid(to),
            content: "hi".into(),
        }
    }

    #[test]
    fn append_requires_writer_as_sender() {
        let key = ConversationKey::between(&uid("a"), &uid("b"));
        assert!(check_append(&uid("a"), &key, &new_message("a", "b")).is_ok());
        assert!(matches!(
            check_append(&uid("b"), &key, &new_message("a", "b")),
            Err(StoreError::PermissionDenied { .. })
        ));
        let other = ConversationKey::between(&uid("a"), &uid("c"));
        assert!(matches!(
            check_append(&uid("a"), &other, &new_message("a", "b")),
            Err(StoreError::Invalid { .. })
        ));
    }

    #[test]
    fn replace_and_remove_require_ownership() {
        let key = ConversationKey::between(&uid("a"), &uid("b"));
        let stored = Message {
            id: MessageId::new(),
            sender_id: uid("a"),
            sender_name: "A".into(),
            receiver_id: uid("b"),
            content: "x".into(),
            timestamp: Utc::now(),
            edited: false,
        };
        assert!(check_replace(&uid("a"), &key, &stored, &stored).is_ok());
        assert!(check_replace(&uid("b"), &key, &stored, &stored).is_err());
        assert!(check_remove(&uid("a"), &key, &stored).is_ok());
        assert!(check_remove(&uid("b"), &key, &stored).is_err());

        let mut hijack = stored.clone();
        hijack.receiver_id = uid("c");
        assert!(matches!(
            check_replace(&uid("a"), &key, &stored, &hijack),
            Err(StoreError::Invalid { .. })
        ));
    }

    #[test]
    fn unread_and_presence_scopes() {
        let key = ConversationKey::between(&uid("a"), &uid("b"));
        assert!(check_unread(&uid("a"), &key, &uid("b")).is_ok());
        assert!(check_unread(&uid("b"), &key, &uid("b")).is_ok());
        assert!(check_unread(&uid("c"), &key, &uid("b")).is_err());
        assert!(check_unread(&uid("a"), &key, &uid("c")).is_err());

        assert!(check_presence(&uid("a"), &uid("a")).is_ok());
        assert!(check_presence(&uid("a"), &uid("b")).is_err());
    }
}
