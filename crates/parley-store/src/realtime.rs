//! The shared store that concurrent writers connect to.
//!
//! [`RealtimeStore`] is a cheap, cloneable handle; all clones address the same
//! state. Writers never touch it directly: they [`connect`](RealtimeStore::connect)
//! as a user and operate through the returned [`Session`], whose identity the
//! access rules check on every write.
//!
//! Writes are serialized by a single lock around the database, stamped by the
//! server clock, and followed by a republish of the affected feeds. Each
//! session operation yields to the runtime once before touching the store,
//! standing in for the network round-trip: two tasks issuing dependent calls
//! interleave here exactly as two remote clients would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use parley_shared::paths::StorePath;
use parley_shared::{ConversationKey, Message, MessageId, NewMessage, UserId};

use crate::clock::{Clock, ServerClock, SystemClock};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::feeds::{ChatTable, Feeds, Subscription, UnreadTable};
use crate::presence::Presence;
use crate::rules;

/// A write the store performs on a session's behalf once that session's
/// connection is gone ("last will").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectAction {
    SetPresence { user: UserId, online: bool },
}

struct PendingActions {
    user: UserId,
    actions: Vec<DisconnectAction>,
}

struct State {
    db: Database,
    clock: ServerClock,
    feeds: Feeds,
    pending: HashMap<u64, PendingActions>,
    next_connection: u64,
    closed: bool,
}

impl State {
    fn publish_chat(&mut self, key: &ConversationKey) {
        let db = &self.db;
        if let Err(e) = self
            .feeds
            .publish_conversation(key, || db.messages_for_conversation(key))
        {
            warn!(conversation = %key, error = %e, "failed to publish conversation snapshot");
        }
        if let Err(e) = self.feeds.publish_chats(|| db.all_messages()) {
            warn!(error = %e, "failed to publish message table");
        }
    }

    fn publish_unreads(&mut self) {
        let db = &self.db;
        if let Err(e) = self.feeds.publish_unreads(|| db.all_unreads()) {
            warn!(error = %e, "failed to publish unread table");
        }
    }

    fn write_presence(&mut self, user: &UserId, online: bool) -> Result<()> {
        let at = self.clock.next();
        self.db.set_presence(user, online, at)?;
        self.feeds.publish_presence(user, online);
        debug!(path = %StorePath::ConnectionStatus(user.clone()), online, "presence written");
        Ok(())
    }

    fn apply(&mut self, action: &DisconnectAction) -> Result<()> {
        match action {
            DisconnectAction::SetPresence { user, online } => self.write_presence(user, *online),
        }
    }
}

/// Handle to the shared store.
#[derive(Clone)]
pub struct RealtimeStore {
    state: Arc<Mutex<State>>,
}

impl RealtimeStore {
    /// Serve `db`, stamping writes with the system clock.
    pub fn open(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                db,
                clock: ServerClock::new(clock),
                feeds: Feeds::default(),
                pending: HashMap::new(),
                next_connection: 1,
                closed: false,
            })),
        }
    }

    /// A store over a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::open(Database::open_in_memory()?))
    }

    /// Open a connection authenticated as `user`.
    pub fn connect(&self, user: UserId) -> Result<Session> {
        let mut state = self.lock()?;
        let connection = state.next_connection;
        state.next_connection += 1;
        state.pending.insert(
            connection,
            PendingActions {
                user: user.clone(),
                actions: Vec::new(),
            },
        );
        info!(%user, connection, "session connected");
        Ok(Session {
            store: self.clone(),
            user,
            connection,
            live: true,
        })
    }

    /// Stop serving. Every feed ends, pending disconnect actions are dropped
    /// and further operations fail with [`StoreError::Closed`].
    pub fn shutdown(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.closed = true;
        state.feeds.close_all();
        state.pending.clear();
        info!("store shut down");
    }

    /// Number of feeds with at least one live subscriber.
    pub fn live_feeds(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.feeds.live_count())
            .unwrap_or(0)
    }

    /// Number of disconnect actions registered across all open connections.
    pub fn pending_disconnect_actions(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.pending.values().map(|p| p.actions.len()).sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state)
    }

    /// Tear down a connection. When the store learns of the disconnect
    /// (`delivered`), it runs the connection's pending actions; when it never
    /// does, they are lost with it.
    fn disconnect(&self, connection: u64, delivered: bool) {
        let Ok(mut state) = self.lock() else {
            return;
        };
        let Some(pending) = state.pending.remove(&connection) else {
            return;
        };

        if !delivered {
            warn!(
                user = %pending.user,
                connection,
                dropped = pending.actions.len(),
                "connection vanished without a disconnect event; last-will actions never ran"
            );
            return;
        }

        info!(
            user = %pending.user,
            connection,
            actions = pending.actions.len(),
            "session disconnected"
        );
        for action in &pending.actions {
            if let Err(e) = state.apply(action) {
                warn!(?action, error = %e, "disconnect action failed");
            }
        }
    }
}

/// One writer's connection to the store.
///
/// Dropping a session is treated as an abrupt disconnect that the store does
/// observe: its registered [`DisconnectAction`]s run. [`Session::close`] is
/// the graceful equivalent, [`Session::abandon`] models the case where the
/// disconnect never reaches the store.
pub struct Session {
    store: RealtimeStore,
    user: UserId,
    connection: u64,
    live: bool,
}

async fn round_trip() {
    tokio::task::yield_now().await;
}

impl Session {
    /// The identity this session writes as.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    // ------------------------------------------------------------------
    // Conversation logs
    // ------------------------------------------------------------------

    /// Append a message; the store assigns its id and timestamp.
    pub async fn append(&self, key: &ConversationKey, message: NewMessage) -> Result<MessageId> {
        round_trip().await;
        let mut guard = self.store.lock()?;
        let state = &mut *guard;

        rules::check_append(&self.user, key, &message)?;

        let stored = Message {
            id: MessageId::new(),
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            receiver_id: message.receiver_id,
            content: message.content,
            timestamp: state.clock.next(),
            edited: false,
        };
        state.db.insert_message(key, &stored)?;
        debug!(path = %StorePath::Message(key.clone(), stored.id), "message appended");

        state.publish_chat(key);
        Ok(stored.id)
    }

    /// Overwrite an existing message with `message`'s content. The store
    /// marks it edited and restamps it. Fails with `NotFound` if the message
    /// is gone; a replace never recreates a deleted message.
    pub async fn replace(&self, key: &ConversationKey, message: &Message) -> Result<Message> {
        round_trip().await;
        let mut guard = self.store.lock()?;
        let state = &mut *guard;

        let stored = state.db.get_message(key, message.id)?;
        rules::check_replace(&self.user, key, &stored, message)?;

        let updated = Message {
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            timestamp: state.clock.next(),
            edited: true,
            ..stored
        };
        state.db.update_message(key, &updated)?;
        debug!(path = %StorePath::Message(key.clone(), updated.id), "message replaced");

        state.publish_chat(key);
        Ok(updated)
    }

    /// Hard-delete a message. Returns `false` if it was already gone.
    pub async fn remove(&self, key: &ConversationKey, id: MessageId) -> Result<bool> {
        round_trip().await;
        let mut guard = self.store.lock()?;
        let state = &mut *guard;

        let stored = match state.db.get_message(key, id) {
            Ok(stored) => stored,
            Err(StoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        rules::check_remove(&self.user, key, &stored)?;

        state.db.delete_message(key, id)?;
        debug!(path = %StorePath::Message(key.clone(), id), "message removed");

        state.publish_chat(key);
        Ok(true)
    }

    /// One-shot read of a conversation log, in no particular order.
    pub async fn messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        round_trip().await;
        self.store.lock()?.db.messages_for_conversation(key)
    }

    pub fn subscribe_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Subscription<Vec<Message>>> {
        let mut guard = self.store.lock()?;
        let state = &mut *guard;
        let db = &state.db;
        let feed = state
            .feeds
            .subscribe_conversation(key, || db.messages_for_conversation(key))?;
        Ok(self.released(feed))
    }

    pub fn subscribe_chats(&self) -> Result<Subscription<ChatTable>> {
        let mut guard = self.store.lock()?;
        let state = &mut *guard;
        let db = &state.db;
        let feed = state.feeds.subscribe_chats(|| db.all_messages())?;
        Ok(self.released(feed))
    }

    // ------------------------------------------------------------------
    // Unread counters
    // ------------------------------------------------------------------

    pub async fn read_unread(&self, key: &ConversationKey, recipient: &UserId) -> Result<u32> {
        round_trip().await;
        self.store.lock()?.db.unread_count(key, recipient)
    }

    /// Unconditional write.
    pub async fn write_unread(
        &self,
        key: &ConversationKey,
        recipient: &UserId,
        count: u32,
    ) -> Result<()> {
        round_trip().await;
        let mut state = self.store.lock()?;

        rules::check_unread(&self.user, key, recipient)?;
        state.db.set_unread(key, recipient, count)?;
        debug!(path = %StorePath::Unread(key.clone(), recipient.clone()), count, "unread written");

        state.publish_unreads();
        Ok(())
    }

    /// Transactional `+1`, returning the new value.
    pub async fn increment_unread(&self, key: &ConversationKey, recipient: &UserId) -> Result<u32> {
        round_trip().await;
        let mut state = self.store.lock()?;

        rules::check_unread(&self.user, key, recipient)?;
        let count = state.db.increment_unread(key, recipient)?;
        debug!(
            path = %StorePath::Unread(key.clone(), recipient.clone()),
            count,
            "unread incremented"
        );

        state.publish_unreads();
        Ok(count)
    }

    pub fn subscribe_unreads(&self) -> Result<Subscription<UnreadTable>> {
        let mut guard = self.store.lock()?;
        let state = &mut *guard;
        let db = &state.db;
        let feed = state.feeds.subscribe_unreads(|| db.all_unreads())?;
        Ok(self.released(feed))
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    pub async fn set_presence(&self, user: &UserId, online: bool) -> Result<()> {
        round_trip().await;
        let mut state = self.store.lock()?;
        rules::check_presence(&self.user, user)?;
        state.write_presence(user, online)
    }

    pub async fn presence(&self, user: &UserId) -> Result<Option<Presence>> {
        round_trip().await;
        self.store.lock()?.db.presence(user)
    }

    /// Live online flag of `user`; a user never seen reads as offline.
    pub fn subscribe_presence(&self, user: &UserId) -> Result<Subscription<bool>> {
        let mut guard = self.store.lock()?;
        let state = &mut *guard;
        let db = &state.db;
        let feed = state.feeds.subscribe_presence(user, || {
            Ok(db.presence(user)?.is_some_and(|p| p.online))
        })?;
        Ok(self.released(feed))
    }

    /// Hand the feed's sender back to the store once its last subscriber
    /// drops.
    fn released<T: Clone>(&self, feed: Subscription<T>) -> Subscription<T> {
        let state = Arc::downgrade(&self.store.state);
        feed.on_release(move |path| {
            let Some(state) = state.upgrade() else {
                return;
            };
            // A busy store is skipped; the next subscribe sweeps the sender.
            let Ok(mut guard) = state.try_lock() else {
                return;
            };
            guard.feeds.release(path);
        })
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Register `action` to run when this connection drops.
    pub async fn on_disconnect(&self, action: DisconnectAction) -> Result<()> {
        round_trip().await;
        let mut state = self.store.lock()?;

        match &action {
            DisconnectAction::SetPresence { user, .. } => rules::check_presence(&self.user, user)?,
        }

        let pending = state
            .pending
            .get_mut(&self.connection)
            .ok_or(StoreError::Closed)?;
        pending.actions.push(action);
        Ok(())
    }

    /// Forget every action registered by this connection.
    pub async fn cancel_on_disconnect(&self) -> Result<()> {
        round_trip().await;
        let mut state = self.store.lock()?;
        if let Some(pending) = state.pending.get_mut(&self.connection) {
            pending.actions.clear();
        }
        Ok(())
    }

    /// Disconnect cleanly. Pending disconnect actions still run.
    pub fn close(mut self) {
        self.live = false;
        self.store.disconnect(self.connection, true);
    }

    /// Vanish without the store ever hearing about it, as when the process
    /// is killed before its socket closes. Pending disconnect actions never
    /// run, so any presence they would have cleared stays set.
    pub fn abandon(mut self) {
        self.live = false;
        self.store.disconnect(self.connection, false);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.live {
            self.store.disconnect(self.connection, true);
        }
    }
}
