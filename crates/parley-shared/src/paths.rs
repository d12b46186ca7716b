//! Hierarchical addresses inside the synchronized store.
//!
//! The store is organised as three trees:
//!
//! ```text
//! chats/{conversationKey}/{messageId}
//! unreads/{conversationKey}/{userId}
//! connectionStatus/{userId}
//! ```
//!
//! Paths are used for log fields and access-rule errors; the store itself
//! indexes by typed keys.

use crate::constants::{CHATS_ROOT, CONNECTION_STATUS_ROOT, UNREADS_ROOT};
use crate::conversation::ConversationKey;
use crate::types::{MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorePath {
    /// Every conversation log.
    Chats,
    /// One conversation log.
    Conversation(ConversationKey),
    /// One message inside a log.
    Message(ConversationKey, MessageId),
    /// The whole unread-counter table.
    Unreads,
    /// One recipient's counter in one conversation.
    Unread(ConversationKey, UserId),
    /// One user's presence flag.
    ConnectionStatus(UserId),
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chats => write!(f, "{CHATS_ROOT}"),
            Self::Conversation(key) => write!(f, "{CHATS_ROOT}/{key}"),
            Self::Message(key, id) => write!(f, "{CHATS_ROOT}/{key}/{id}"),
            Self::Unreads => write!(f, "{UNREADS_ROOT}"),
            Self::Unread(key, user) => write!(f, "{UNREADS_ROOT}/{key}/{user}"),
            Self::ConnectionStatus(user) => write!(f, "{CONNECTION_STATUS_ROOT}/{user}"),
        }
    }
}
