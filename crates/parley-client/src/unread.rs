//! Unread counter adapter.
//!
//! Counters live at `unreads/{key}/{recipient}`. A send bumps the receiver's
//! counter; opening a conversation zeroes your own.
//!
//! Two increment strategies are offered. [`IncrementMode::Atomic`] uses the
//! store's transactional increment and never loses a count.
//! [`IncrementMode::ReadModifyWrite`] reads the value and writes `value + 1`
//! in a second round-trip: two sends racing to the same idle recipient can
//! both read `n` and both write `n + 1`, under-counting by one. Kept for
//! stores without an atomic primitive; the loss is accepted, not repaired.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use parley_shared::{ConversationKey, UserId};
use parley_store::{Result, Session, Subscription, UnreadTable};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncrementMode {
    #[default]
    Atomic,
    ReadModifyWrite,
}

impl FromStr for IncrementMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(Self::Atomic),
            "read-modify-write" | "rmw" => Ok(Self::ReadModifyWrite),
            other => Err(format!("unknown increment mode {other:?}")),
        }
    }
}

pub struct UnreadCounter<'a> {
    session: &'a Session,
    mode: IncrementMode,
}

impl<'a> UnreadCounter<'a> {
    pub fn new(session: &'a Session, mode: IncrementMode) -> Self {
        Self { session, mode }
    }

    /// Add one to `recipient`'s counter and return the value written.
    pub async fn increment(&self, key: &ConversationKey, recipient: &UserId) -> Result<u32> {
        let count = match self.mode {
            IncrementMode::Atomic => self.session.increment_unread(key, recipient).await?,
            IncrementMode::ReadModifyWrite => {
                let current = self.session.read_unread(key, recipient).await?;
                let next = current.saturating_add(1);
                self.session.write_unread(key, recipient, next).await?;
                next
            }
        };
        debug!(conversation = %key, %recipient, count, mode = ?self.mode, "unread incremented");
        Ok(count)
    }

    pub async fn reset(&self, key: &ConversationKey, recipient: &UserId) -> Result<()> {
        self.session.write_unread(key, recipient, 0).await
    }

    /// The whole counter table; narrow it with [`counts_for`].
    pub fn subscribe_all(&self) -> Result<Subscription<UnreadTable>> {
        self.session.subscribe_unreads()
    }
}

/// Reduce the counter table to `{counterpart -> unread}` for `me` as the
/// recipient, ignoring conversations `me` is not part of.
pub fn counts_for(table: &UnreadTable, me: &UserId) -> HashMap<UserId, u32> {
    table
        .iter()
        .filter_map(|(key, counters)| {
            let counterpart = key.counterpart_of(me)?;
            let count = counters.get(me).copied().unwrap_or(0);
            Some((counterpart, count))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::RealtimeStore;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[tokio::test]
    async fn increment_then_reset() {
        let store = RealtimeStore::in_memory().unwrap();
        let alice = store.connect(uid("alice")).unwrap();
        let bob = store.connect(uid("bob")).unwrap();
        let key = ConversationKey::between(&uid("alice"), &uid("bob"));

        let counter = UnreadCounter::new(&alice, IncrementMode::Atomic);
        assert_eq!(counter.increment(&key, &uid("bob")).await.unwrap(), 1);
        assert_eq!(counter.increment(&key, &uid("bob")).await.unwrap(), 2);

        UnreadCounter::new(&bob, IncrementMode::Atomic)
            .reset(&key, &uid("bob"))
            .await
            .unwrap();
        assert_eq!(bob.read_unread(&key, &uid("bob")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn racing_read_modify_write_loses_an_increment() {
        let store = RealtimeStore::in_memory().unwrap();
        let tab_one = store.connect(uid("alice")).unwrap();
        let tab_two = store.connect(uid("alice")).unwrap();
        let key = ConversationKey::between(&uid("alice"), &uid("bob"));
        let bob = uid("bob");

        let first = UnreadCounter::new(&tab_one, IncrementMode::ReadModifyWrite);
        let second = UnreadCounter::new(&tab_two, IncrementMode::ReadModifyWrite);

        // Both reads complete before either write lands.
        let (a, b) = tokio::join!(first.increment(&key, &bob), second.increment(&key, &bob));
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
        assert_eq!(tab_one.read_unread(&key, &bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn racing_atomic_increments_both_land() {
        let store = RealtimeStore::in_memory().unwrap();
        let tab_one = store.connect(uid("alice")).unwrap();
        let tab_two = store.connect(uid("alice")).unwrap();
        let key = ConversationKey::between(&uid("alice"), &uid("bob"));
        let bob = uid("bob");

        let first = UnreadCounter::new(&tab_one, IncrementMode::Atomic);
        let second = UnreadCounter::new(&tab_two, IncrementMode::Atomic);

        let (a, b) = tokio::join!(first.increment(&key, &bob), second.increment(&key, &bob));
        let mut seen = [a.unwrap(), b.unwrap()];
        seen.sort_unstable();
        assert_eq!(seen, [1, 2]);
        assert_eq!(tab_one.read_unread(&key, &bob).await.unwrap(), 2);
    }

    #[test]
    fn counts_for_filters_to_my_conversations() {
        let me = uid("me");
        let mut table = UnreadTable::new();
        table.insert(
            ConversationKey::between(&me, &uid("x")),
            HashMap::from([(me.clone(), 3), (uid("x"), 1)]),
        );
        table.insert(
            ConversationKey::between(&me, &uid("y")),
            HashMap::from([(uid("y"), 5)]),
        );
        table.insert(
            ConversationKey::between(&uid("x"), &uid("y")),
            HashMap::from([(uid("x"), 9)]),
        );

        let counts = counts_for(&table, &me);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&uid("x")], 3);
        assert_eq!(counts[&uid("y")], 0);
    }

    #[test]
    fn parses_modes() {
        assert_eq!("atomic".parse::<IncrementMode>(), Ok(IncrementMode::Atomic));
        assert_eq!(
            "Read-Modify-Write".parse::<IncrementMode>(),
            Ok(IncrementMode::ReadModifyWrite)
        );
        assert!("eventually".parse::<IncrementMode>().is_err());
    }
}
