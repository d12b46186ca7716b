//! Canonical identity of a two-party conversation.
//!
//! A conversation has no record of its own: it is addressed purely by the key
//! derived from its two participants, `min(a, b) + "_" + max(a, b)`. Because
//! the delimiter can never appear inside a [`UserId`], distinct unordered
//! pairs never collide and the key can always be split back into its
//! participants.

use serde::{Deserialize, Serialize};

use crate::constants::KEY_DELIMITER;
use crate::error::IdError;
use crate::types::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Derive the key for two raw identifiers.
    ///
    /// Returns `None` if either side is empty or is not a valid user id.
    pub fn derive(a: &str, b: &str) -> Option<Self> {
        let a = UserId::new(a).ok()?;
        let b = UserId::new(b).ok()?;
        Some(Self::between(&a, &b))
    }

    /// Derive the key for two validated ids. Order-independent.
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}{KEY_DELIMITER}{hi}"))
    }

    /// Parse a key read back from the store.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let (a, b) = raw
            .split_once(KEY_DELIMITER)
            .ok_or_else(|| IdError::MalformedKey(raw.to_string()))?;
        let a = UserId::new(a).map_err(|_| IdError::MalformedKey(raw.to_string()))?;
        let b = UserId::new(b).map_err(|_| IdError::MalformedKey(raw.to_string()))?;
        if a > b {
            return Err(IdError::MalformedKey(raw.to_string()));
        }
        Ok(Self::between(&a, &b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two participants, lower id first.
    pub fn participants(&self) -> (UserId, UserId) {
        // Construction guarantees exactly one delimiter between two valid ids.
        let (a, b) = self.0.split_once(KEY_DELIMITER).unwrap_or((&self.0, ""));
        (UserId(a.to_string()), UserId(b.to_string()))
    }

    pub fn involves(&self, user: &UserId) -> bool {
        let (a, b) = self.participants();
        a == *user || b == *user
    }

    /// The other participant, or `None` if `user` is not part of this
    /// conversation. A self-conversation returns `user` itself.
    pub fn counterpart_of(&self, user: &UserId) -> Option<UserId> {
        let (a, b) = self.participants();
        if a == *user {
            Some(b)
        } else if b == *user {
            Some(a)
        } else {
            None
        }
    }
}

impl TryFrom<String> for ConversationKey {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConversationKey> for String {
    fn from(key: ConversationKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
