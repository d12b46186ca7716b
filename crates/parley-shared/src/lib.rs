//! # parley-shared
//!
//! Types shared by the store and the client: user and message identifiers,
//! the message record itself, the canonical conversation key and the
//! hierarchical store paths they are addressed by.

pub mod constants;
pub mod conversation;
pub mod error;
pub mod message;
pub mod paths;
pub mod types;

pub use conversation::ConversationKey;
pub use error::IdError;
pub use message::{Message, NewMessage};
pub use types::{CurrentUser, MessageId, User, UserId};
