//! Live snapshot feeds.
//!
//! A feed carries the complete current state of one tree (a conversation log,
//! the whole message table, the unread table, or one presence flag). Every
//! mutation of that tree replaces the value, so a subscriber that falls behind
//! skips straight to the latest snapshot instead of replaying diffs.
//!
//! Feeds are created on first subscription and released when their last
//! subscriber drops. Anything a release could not reach is swept on the next
//! subscribe or mutation.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::watch;
use tracing::debug;

use parley_shared::paths::StorePath;
use parley_shared::{ConversationKey, Message, UserId};

use crate::error::Result;

/// Every conversation log, keyed by conversation.
pub type ChatTable = HashMap<ConversationKey, Vec<Message>>;

/// Every unread counter, keyed by conversation then recipient.
pub type UnreadTable = HashMap<ConversationKey, HashMap<UserId, u32>>;

type Release = Box<dyn FnOnce(&StorePath) + Send + Sync>;

/// Receiving half of a feed.
///
/// Dropping the subscription (or calling [`Subscription::cancel`]) detaches it
/// immediately; no further snapshots are delivered.
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
    path: StorePath,
    release: Option<Release>,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(&self.path);
        }
    }
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(rx: watch::Receiver<T>, path: StorePath) -> Self {
        Self {
            rx,
            path,
            release: None,
        }
    }

    /// Run `release` when this subscription goes away. It runs while the
    /// receiver is still counted.
    pub(crate) fn on_release(
        mut self,
        release: impl FnOnce(&StorePath) + Send + Sync + 'static,
    ) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// The latest snapshot, marking it as seen.
    pub fn snapshot(&mut self) -> T {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next snapshot. Returns `None` once the feed has ended
    /// (the store shut down); the subscription will never fire again.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn cancel(self) {
        debug!(path = %self.path, "subscription cancelled");
    }
}

/// Sending halves of every open feed.
#[derive(Default)]
pub(crate) struct Feeds {
    conversations: HashMap<ConversationKey, watch::Sender<Vec<Message>>>,
    chats: Option<watch::Sender<ChatTable>>,
    unreads: Option<watch::Sender<UnreadTable>>,
    presence: HashMap<UserId, watch::Sender<bool>>,
}

impl Feeds {
    pub(crate) fn subscribe_conversation(
        &mut self,
        key: &ConversationKey,
        load: impl FnOnce() -> Result<Vec<Message>>,
    ) -> Result<Subscription<Vec<Message>>> {
        self.prune();
        let rx = subscribe_keyed(&mut self.conversations, key, load)?;
        Ok(Subscription::new(rx, StorePath::Conversation(key.clone())))
    }

    pub(crate) fn subscribe_chats(
        &mut self,
        load: impl FnOnce() -> Result<ChatTable>,
    ) -> Result<Subscription<ChatTable>> {
        self.prune();
        let rx = subscribe_single(&mut self.chats, load)?;
        Ok(Subscription::new(rx, StorePath::Chats))
    }

    pub(crate) fn subscribe_unreads(
        &mut self,
        load: impl FnOnce() -> Result<UnreadTable>,
    ) -> Result<Subscription<UnreadTable>> {
        self.prune();
        let rx = subscribe_single(&mut self.unreads, load)?;
        Ok(Subscription::new(rx, StorePath::Unreads))
    }

    pub(crate) fn subscribe_presence(
        &mut self,
        user: &UserId,
        load: impl FnOnce() -> Result<bool>,
    ) -> Result<Subscription<bool>> {
        self.prune();
        let rx = subscribe_keyed(&mut self.presence, user, load)?;
        Ok(Subscription::new(rx, StorePath::ConnectionStatus(user.clone())))
    }

    pub(crate) fn publish_conversation(
        &mut self,
        key: &ConversationKey,
        load: impl FnOnce() -> Result<Vec<Message>>,
    ) -> Result<()> {
        publish_keyed(&mut self.conversations, key, load)
    }

    pub(crate) fn publish_chats(&mut self, load: impl FnOnce() -> Result<ChatTable>) -> Result<()> {
        publish_single(&mut self.chats, load)
    }

    pub(crate) fn publish_unreads(
        &mut self,
        load: impl FnOnce() -> Result<UnreadTable>,
    ) -> Result<()> {
        publish_single(&mut self.unreads, load)
    }

    pub(crate) fn publish_presence(&mut self, user: &UserId, online: bool) {
        let _ = publish_keyed(&mut self.presence, user, || Ok(online));
    }

    /// Number of feeds that still have at least one subscriber.
    pub(crate) fn live_count(&self) -> usize {
        let keyed = self
            .conversations
            .values()
            .filter(|tx| tx.receiver_count() > 0)
            .count()
            + self
                .presence
                .values()
                .filter(|tx| tx.receiver_count() > 0)
                .count();
        let single = [
            self.chats.as_ref().map(|tx| tx.receiver_count()),
            self.unreads.as_ref().map(|tx| tx.receiver_count()),
        ]
        .into_iter()
        .flatten()
        .filter(|n| *n > 0)
        .count();
        keyed + single
    }

    /// Drop the sender at `path` if the one subscriber being released is
    /// its last.
    pub(crate) fn release(&mut self, path: &StorePath) {
        let last = |count: usize| count <= 1;
        let released = match path {
            StorePath::Conversation(key) => {
                remove_keyed_if(&mut self.conversations, key, |tx| last(tx.receiver_count()))
            }
            StorePath::ConnectionStatus(user) => {
                remove_keyed_if(&mut self.presence, user, |tx| last(tx.receiver_count()))
            }
            StorePath::Chats => {
                remove_single_if(&mut self.chats, |tx| last(tx.receiver_count()))
            }
            StorePath::Unreads => {
                remove_single_if(&mut self.unreads, |tx| last(tx.receiver_count()))
            }
            StorePath::Message(..) | StorePath::Unread(..) => false,
        };
        if released {
            debug!(%path, "feed released");
        }
    }

    /// Drop every sender nobody listens to.
    pub(crate) fn prune(&mut self) {
        self.conversations.retain(|_, tx| tx.receiver_count() > 0);
        self.presence.retain(|_, tx| tx.receiver_count() > 0);
        remove_single_if(&mut self.chats, |tx| tx.receiver_count() == 0);
        remove_single_if(&mut self.unreads, |tx| tx.receiver_count() == 0);
    }

    /// Number of senders held, listened to or not.
    pub(crate) fn retained_count(&self) -> usize {
        self.conversations.len()
            + self.presence.len()
            + usize::from(self.chats.is_some())
            + usize::from(self.unreads.is_some())
    }

    /// Drop every sender. Subscribers observe the end of their feed.
    pub(crate) fn close_all(&mut self) {
        self.conversations.clear();
        self.presence.clear();
        self.chats = None;
        self.unreads = None;
    }
}

fn remove_keyed_if<K, T>(
    senders: &mut HashMap<K, watch::Sender<T>>,
    key: &K,
    pred: impl FnOnce(&watch::Sender<T>) -> bool,
) -> bool
where
    K: Eq + Hash,
{
    if senders.get(key).is_some_and(pred) {
        senders.remove(key);
        return true;
    }
    false
}

fn remove_single_if<T>(
    sender: &mut Option<watch::Sender<T>>,
    pred: impl FnOnce(&watch::Sender<T>) -> bool,
) -> bool {
    if sender.as_ref().is_some_and(pred) {
        *sender = None;
        return true;
    }
    false
}

fn subscribe_keyed<K, T>(
    senders: &mut HashMap<K, watch::Sender<T>>,
    key: &K,
    load: impl FnOnce() -> Result<T>,
) -> Result<watch::Receiver<T>>
where
    K: Eq + Hash + Clone,
{
    if let Some(tx) = senders.get(key) {
        return Ok(tx.subscribe());
    }
    let (tx, rx) = watch::channel(load()?);
    senders.insert(key.clone(), tx);
    Ok(rx)
}

fn subscribe_single<T>(
    sender: &mut Option<watch::Sender<T>>,
    load: impl FnOnce() -> Result<T>,
) -> Result<watch::Receiver<T>> {
    if let Some(tx) = sender {
        return Ok(tx.subscribe());
    }
    let (tx, rx) = watch::channel(load()?);
    *sender = Some(tx);
    Ok(rx)
}

fn publish_keyed<K, T>(
    senders: &mut HashMap<K, watch::Sender<T>>,
    key: &K,
    load: impl FnOnce() -> Result<T>,
) -> Result<()>
where
    K: Eq + Hash,
{
    let Some(tx) = senders.get(key) else {
        return Ok(());
    };
    if tx.receiver_count() == 0 {
        senders.remove(key);
        return Ok(());
    }
    tx.send_replace(load()?);
    Ok(())
}

fn publish_single<T>(
    sender: &mut Option<watch::Sender<T>>,
    load: impl FnOnce() -> Result<T>,
) -> Result<()> {
    let Some(tx) = sender else {
        return Ok(());
    };
    if tx.receiver_count() == 0 {
        *sender = None;
        return Ok(());
    }
    tx.send_replace(load()?);
    Ok(())
}
