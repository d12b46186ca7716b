//! The chat view controller.
//!
//! One controller backs one mounted chat view. It is built with everything it
//! needs (store, signed-in identity, directory, event sink) and owns the
//! view's store session plus every live feed the view listens to:
//!
//! * the message table and unread table, always, for the roster;
//! * the open conversation's log and the counterpart's presence, while a
//!   conversation is selected.
//!
//! The controller never edits its message list locally. Sends, edits and
//! deletes go to the store; the list changes only when the log feed echoes
//! the new state back through [`ChatController::next_update`].

use std::collections::HashMap;
use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use parley_shared::{ConversationKey, CurrentUser, Message, MessageId, User, UserId};
use parley_store::{ChatTable, RealtimeStore, Session, StoreError, Subscription, UnreadTable};

use crate::directory::Directory;
use crate::error::ClientError;
use crate::events::{ChatEvent, EventSink, NoticeLevel};
use crate::message_log::MessageLog;
use crate::presence::PresenceTracker;
use crate::roster::{self, RosterEntry};
use crate::timeline::{self, DayGroup};
use crate::unread::{self, IncrementMode, UnreadCounter};

/// The live feeds a controller can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Feed {
    Conversation,
    Presence,
    Chats,
    Unreads,
}

/// What [`ChatController::next_update`] applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Messages,
    Presence(bool),
    Roster,
    FeedLost(Feed),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    NoSelection,
    Selected {
        counterpart: User,
        key: ConversationKey,
    },
}

pub struct ChatController {
    identity: Option<CurrentUser>,
    session: Option<Session>,
    users: Vec<User>,
    increment_mode: IncrementMode,
    events: EventSink,

    view: ViewState,
    messages: Vec<Message>,
    input: String,
    editing: Option<MessageId>,
    counterpart_online: bool,
    scroll_pending: bool,
    stale: bool,

    last_messages: HashMap<UserId, Message>,
    unread_counts: HashMap<UserId, u32>,

    log_feed: Option<Subscription<Vec<Message>>>,
    presence_feed: Option<Subscription<bool>>,
    chats_feed: Option<Subscription<ChatTable>>,
    unreads_feed: Option<Subscription<UnreadTable>>,
}

impl ChatController {
    /// Mount a chat view.
    ///
    /// Without an identity the controller is inert: nothing can be selected
    /// or sent. Otherwise the directory is fetched once (a failure leaves the
    /// roster empty and raises a notice), a store session is opened, the user
    /// is marked online and the roster feeds are started.
    pub async fn mount<D: Directory>(
        store: &RealtimeStore,
        identity: Option<CurrentUser>,
        directory: &D,
        increment_mode: IncrementMode,
        events: EventSink,
    ) -> Result<Self, ClientError> {
        let mut controller = Self {
            identity: None,
            session: None,
            users: Vec::new(),
            increment_mode,
            events,
            view: ViewState::NoSelection,
            messages: Vec::new(),
            input: String::new(),
            editing: None,
            counterpart_online: false,
            scroll_pending: false,
            stale: false,
            last_messages: HashMap::new(),
            unread_counts: HashMap::new(),
            log_feed: None,
            presence_feed: None,
            chats_feed: None,
            unreads_feed: None,
        };

        let Some(me) = identity else {
            info!("no signed-in user; messaging disabled");
            return Ok(controller);
        };

        match directory.list_users().await {
            Ok(users) => controller.users = users,
            Err(e) => {
                error!(error = %e, "failed to load user directory");
                controller
                    .events
                    .notify(NoticeLevel::Error, format!("Could not load contacts: {e}"));
            }
        }

        let session = store.connect(me.id.clone())?;
        if let Err(e) = PresenceTracker::new(&session).mark_online(&me.id).await {
            warn!(user = %me.id, error = %e, "failed to publish presence");
        }

        controller.identity = Some(me);
        controller.session = Some(session);
        controller.subscribe_roster_feeds()?;

        info!(
            user = %controller.me()?.id,
            contacts = controller.users.len(),
            "chat view mounted"
        );
        Ok(controller)
    }

    // ------------------------------------------------------------------
    // Read-only view state
    // ------------------------------------------------------------------

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn identity(&self) -> Option<&CurrentUser> {
        self.identity.as_ref()
    }

    /// The open conversation's messages in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn editing(&self) -> Option<MessageId> {
        self.editing
    }

    pub fn counterpart_online(&self) -> bool {
        self.counterpart_online
    }

    /// Whether a live feed has ended since the last successful
    /// [`refresh_feeds`](Self::refresh_feeds).
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        match &self.identity {
            Some(me) => roster::project(
                &self.users,
                &me.id,
                &self.last_messages,
                &self.unread_counts,
            ),
            None => Vec::new(),
        }
    }

    pub fn day_groups<Tz: TimeZone>(&self, tz: &Tz, now: DateTime<Utc>) -> Vec<DayGroup> {
        timeline::group_by_day(&self.messages, tz, now)
    }

    /// `HH:MM` label for one message.
    pub fn message_time<Tz>(&self, message: &Message, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        timeline::time_of_day(message.timestamp, tz)
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Open the conversation with `counterpart`.
    ///
    /// The previous conversation's feeds are cancelled before the new ones
    /// are opened. The initial snapshot is installed immediately and the
    /// caller's unread counter for it is zeroed.
    pub async fn select(&mut self, counterpart: &User) -> Result<(), ClientError> {
        let me_id = self.me()?.id.clone();

        let Some(key) = ConversationKey::derive(me_id.as_str(), counterpart.id.as_str()) else {
            warn!(counterpart = %counterpart.id, "no conversation key; staying unselected");
            self.leave();
            return Ok(());
        };

        self.leave();

        let session = self.session()?;
        let mut log = MessageLog::new(session).subscribe(&key)?;
        let presence = match PresenceTracker::new(session).watch(&counterpart.id) {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!(counterpart = %counterpart.id, error = %e, "presence unavailable");
                None
            }
        };

        debug!(conversation = %key, "conversation opened");
        self.view = ViewState::Selected {
            counterpart: counterpart.clone(),
            key,
        };
        self.scroll_pending = true;
        self.apply_messages(log.snapshot());
        self.log_feed = Some(log);
        if let Some(mut presence) = presence {
            self.counterpart_online = presence.snapshot();
            self.presence_feed = Some(presence);
        }

        // A failed reset already raised a notice; the conversation stays open.
        let _ = self.mark_read().await;
        Ok(())
    }

    /// Close the open conversation, if any.
    pub fn deselect(&mut self) {
        self.leave();
    }

    /// Zero the signed-in user's unread counter for the open conversation.
    pub async fn mark_read(&mut self) -> Result<(), ClientError> {
        let me_id = self.me()?.id.clone();
        let key = self.selected_key()?;

        let result = UnreadCounter::new(self.session()?, self.increment_mode)
            .reset(&key, &me_id)
            .await;
        if let Err(e) = result {
            self.report_failure("mark as read", &e);
            return Err(e.into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Send the input: a new message, or the staged edit if there is one.
    ///
    /// On success the input and staged edit are cleared. On a store failure a
    /// notice is raised and both are left as they were, so the user can retry.
    pub async fn send(&mut self) -> Result<(), ClientError> {
        let content = self.input.trim().to_string();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let me = self.me()?.clone();
        let (counterpart, key) = match &self.view {
            ViewState::Selected { counterpart, key } => (counterpart.id.clone(), key.clone()),
            ViewState::NoSelection => return Err(ClientError::NoSelection),
        };

        match self.editing {
            Some(id) => {
                let Some(original) = self.messages.iter().find(|m| m.id == id).cloned() else {
                    self.editing = None;
                    self.events.notify(
                        NoticeLevel::Warning,
                        "The message you were editing was deleted",
                    );
                    return Err(ClientError::EditTargetGone);
                };

                let result = MessageLog::new(self.session()?)
                    .edit(&key, &original, &content)
                    .await;
                if let Err(e) = result {
                    self.report_failure("edit", &e);
                    return Err(e.into());
                }
            }
            None => {
                let session = self.session()?;
                let sent = MessageLog::new(session)
                    .send(&key, &me, &counterpart, &content)
                    .await;
                if let Err(e) = sent {
                    self.report_failure("send", &e);
                    return Err(e.into());
                }

                // The message is already visible; a failed bump only leaves
                // the recipient's badge short.
                let bumped = UnreadCounter::new(session, self.increment_mode)
                    .increment(&key, &counterpart)
                    .await;
                if let Err(e) = bumped {
                    warn!(
                        conversation = %key,
                        error = %e,
                        "message sent but unread count not updated"
                    );
                    self.events.notify(
                        NoticeLevel::Warning,
                        "Message sent, but the recipient may not be notified",
                    );
                }
            }
        }

        self.input.clear();
        self.editing = None;
        self.scroll_pending = true;
        Ok(())
    }

    /// Load one of the user's own messages into the input for editing.
    /// Returns `false`, changing nothing, for anyone else's message.
    pub fn stage_edit(&mut self, id: MessageId) -> bool {
        let Some(me) = &self.identity else {
            return false;
        };
        let Some(message) = self.messages.iter().find(|m| m.id == id) else {
            return false;
        };
        if !message.is_from(&me.id) {
            debug!(message = %id, "ignoring edit of another user's message");
            return false;
        }

        self.input = message.content.clone();
        self.editing = Some(id);
        true
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.input.clear();
    }

    /// Delete one of the user's own messages in the open conversation.
    /// Returns `Ok(false)` for messages the user does not own or that are not
    /// shown. Irreversible.
    pub async fn delete(&mut self, id: MessageId) -> Result<bool, ClientError> {
        let me_id = self.me()?.id.clone();
        let key = self.selected_key()?;

        let Some(message) = self.messages.iter().find(|m| m.id == id) else {
            return Ok(false);
        };
        if !message.is_from(&me_id) {
            debug!(message = %id, "ignoring delete of another user's message");
            return Ok(false);
        }

        let removed = MessageLog::new(self.session()?).remove(&key, id).await;
        match removed {
            Ok(removed) => {
                if self.editing == Some(id) {
                    self.cancel_edit();
                }
                Ok(removed)
            }
            Err(e) => {
                self.report_failure("delete", &e);
                Err(e.into())
            }
        }
    }

    // ------------------------------------------------------------------
    // Live updates
    // ------------------------------------------------------------------

    /// Wait for the next change on any live feed and apply it.
    ///
    /// Returns `None` once no feed is left to wait on.
    pub async fn next_update(&mut self) -> Option<Update> {
        if self.log_feed.is_none()
            && self.presence_feed.is_none()
            && self.chats_feed.is_none()
            && self.unreads_feed.is_none()
        {
            return None;
        }

        tokio::select! {
            snapshot = next_from(&mut self.log_feed) => Some(match snapshot {
                Some(messages) => {
                    self.apply_messages(messages);
                    Update::Messages
                }
                None => self.lose(Feed::Conversation),
            }),
            online = next_from(&mut self.presence_feed) => Some(match online {
                Some(online) => {
                    self.apply_presence(online);
                    Update::Presence(online)
                }
                None => self.lose(Feed::Presence),
            }),
            table = next_from(&mut self.chats_feed) => Some(match table {
                Some(table) => {
                    self.apply_chats(&table);
                    Update::Roster
                }
                None => self.lose(Feed::Chats),
            }),
            table = next_from(&mut self.unreads_feed) => Some(match table {
                Some(table) => {
                    self.apply_unreads(&table);
                    Update::Roster
                }
                None => self.lose(Feed::Unreads),
            }),
        }
    }

    /// Reopen any feed that has ended. Clears the stale flag on success.
    pub fn refresh_feeds(&mut self) -> Result<(), ClientError> {
        self.me()?;
        self.subscribe_roster_feeds()?;

        if let ViewState::Selected { counterpart, key } = &self.view {
            let (counterpart, key) = (counterpart.id.clone(), key.clone());
            if self.presence_feed.is_none() {
                let mut presence = PresenceTracker::new(self.session()?).watch(&counterpart)?;
                self.counterpart_online = presence.snapshot();
                self.presence_feed = Some(presence);
            }
            if self.log_feed.is_none() {
                let mut log = MessageLog::new(self.session()?).subscribe(&key)?;
                let snapshot = log.snapshot();
                self.log_feed = Some(log);
                self.apply_messages(snapshot);
            }
        }

        self.stale = false;
        Ok(())
    }

    /// Tear the view down: cancel every feed, publish the user as offline
    /// and close the session.
    pub async fn unmount(mut self) {
        self.leave();
        if let Some(feed) = self.chats_feed.take() {
            feed.cancel();
        }
        if let Some(feed) = self.unreads_feed.take() {
            feed.cancel();
        }

        if let (Some(me), Some(session)) = (self.identity.take(), self.session.take()) {
            if let Err(e) = PresenceTracker::new(&session).mark_offline(&me.id).await {
                warn!(user = %me.id, error = %e, "failed to publish offline presence");
            }
            session.close();
            info!(user = %me.id, "chat view unmounted");
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn me(&self) -> Result<&CurrentUser, ClientError> {
        self.identity.as_ref().ok_or(ClientError::NoIdentity)
    }

    fn session(&self) -> Result<&Session, ClientError> {
        self.session.as_ref().ok_or(ClientError::NoIdentity)
    }

    fn selected_key(&self) -> Result<ConversationKey, ClientError> {
        match &self.view {
            ViewState::Selected { key, .. } => Ok(key.clone()),
            ViewState::NoSelection => Err(ClientError::NoSelection),
        }
    }

    fn subscribe_roster_feeds(&mut self) -> Result<(), ClientError> {
        let me_id = self.me()?.id.clone();
        let session = self.session.as_ref().ok_or(ClientError::NoIdentity)?;

        if self.chats_feed.is_none() {
            let mut feed = MessageLog::new(session).subscribe_all()?;
            self.last_messages = roster::last_messages(&feed.snapshot(), &me_id);
            self.chats_feed = Some(feed);
        }
        if self.unreads_feed.is_none() {
            let mut feed = UnreadCounter::new(session, self.increment_mode).subscribe_all()?;
            self.unread_counts = unread::counts_for(&feed.snapshot(), &me_id);
            self.unreads_feed = Some(feed);
        }
        Ok(())
    }

    /// Cancel the conversation feeds and reset per-conversation state.
    fn leave(&mut self) {
        if let Some(feed) = self.log_feed.take() {
            feed.cancel();
        }
        if let Some(feed) = self.presence_feed.take() {
            feed.cancel();
        }
        if self.editing.is_some() {
            self.cancel_edit();
        }
        self.view = ViewState::NoSelection;
        self.messages.clear();
        self.counterpart_online = false;
        self.scroll_pending = false;
    }

    fn apply_messages(&mut self, mut messages: Vec<Message>) {
        timeline::order(&mut messages);
        self.messages = messages;
        self.events.emit(ChatEvent::MessagesChanged {
            count: self.messages.len(),
        });
        if std::mem::take(&mut self.scroll_pending) {
            self.events.emit(ChatEvent::ScrollToBottom);
        }
    }

    fn apply_presence(&mut self, online: bool) {
        self.counterpart_online = online;
        if let ViewState::Selected { counterpart, .. } = &self.view {
            self.events.emit(ChatEvent::PresenceChanged {
                user: counterpart.id.clone(),
                online,
            });
        }
    }

    fn apply_chats(&mut self, table: &ChatTable) {
        if let Some(me) = &self.identity {
            self.last_messages = roster::last_messages(table, &me.id);
            self.events.emit(ChatEvent::RosterChanged);
        }
    }

    fn apply_unreads(&mut self, table: &UnreadTable) {
        if let Some(me) = &self.identity {
            self.unread_counts = unread::counts_for(table, &me.id);
            self.events.emit(ChatEvent::RosterChanged);
        }
    }

    fn lose(&mut self, feed: Feed) -> Update {
        match feed {
            Feed::Conversation => self.log_feed = None,
            Feed::Presence => self.presence_feed = None,
            Feed::Chats => self.chats_feed = None,
            Feed::Unreads => self.unreads_feed = None,
        }
        warn!(?feed, "live feed ended");
        if !self.stale {
            self.events.notify(
                NoticeLevel::Warning,
                "Live updates stopped; messages shown may be out of date",
            );
        }
        self.stale = true;
        self.events.emit(ChatEvent::FeedLost { feed });
        Update::FeedLost(feed)
    }

    fn report_failure(&self, action: &str, e: &StoreError) {
        error!(action, error = %e, "store write failed");
        self.events
            .notify(NoticeLevel::Error, format!("Could not {action} message: {e}"));
    }
}

async fn next_from<T: Clone>(feed: &mut Option<Subscription<T>>) -> Option<T> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use parley_store::{Database, ManualClock};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn user(id: &str, name: &str) -> User {
        User {
            id: uid(id),
            name: name.into(),
            email: format!("{id}@realty.example"),
            avatar: None,
        }
    }

    fn me(id: &str, name: &str) -> CurrentUser {
        CurrentUser {
            id: uid(id),
            name: name.into(),
        }
    }

    fn directory() -> crate::directory::StaticDirectory {
        crate::directory::StaticDirectory::new(vec![
            user("alice", "Alice"),
            user("bob", "Bob"),
            user("carol", "Carol"),
        ])
    }

    fn store() -> RealtimeStore {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        RealtimeStore::with_clock(
            Database::open_in_memory().unwrap(),
            Arc::new(ManualClock::new(start)),
        )
    }

    async fn mount(
        store: &RealtimeStore,
        who: CurrentUser,
    ) -> (ChatController, UnboundedReceiver<ChatEvent>) {
        let (events, rx) = EventSink::channel();
        let controller = ChatController::mount(
            store,
            Some(who),
            &directory(),
            IncrementMode::Atomic,
            events,
        )
        .await
        .unwrap();
        (controller, rx)
    }

    /// Apply updates until every feed has been quiet for a moment.
    async fn settle(controller: &mut ChatController) {
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(50), controller.next_update()).await
        {}
    }

    fn drain(rx: &mut UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn notices(events: &[ChatEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ChatEvent::Notice(_)))
            .count()
    }

    #[tokio::test]
    async fn send_echoes_back_and_bumps_recipient_unread() {
        let store = store();
        let (mut alice, mut events) = mount(&store, me("alice", "Alice")).await;
        let observer = store.connect(uid("bob")).unwrap();

        alice.select(&user("bob", "Bob")).await.unwrap();
        drain(&mut events);

        alice.set_input("  Offer accepted on 12 Elm St  ");
        alice.send().await.unwrap();
        assert_eq!(alice.input(), "");
        // Nothing is shown until the store echoes the write.
        assert!(alice.messages().is_empty());

        settle(&mut alice).await;
        assert_eq!(alice.messages().len(), 1);
        assert_eq!(alice.messages()[0].content, "Offer accepted on 12 Elm St");
        assert_eq!(alice.messages()[0].sender_name, "Alice");
        assert!(drain(&mut events).contains(&ChatEvent::ScrollToBottom));

        let key = ConversationKey::between(&uid("alice"), &uid("bob"));
        assert_eq!(observer.read_unread(&key, &uid("bob")).await.unwrap(), 1);
        assert_eq!(observer.read_unread(&key, &uid("alice")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn opening_a_conversation_zeroes_own_unread() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        let (mut bob, _bob_events) = mount(&store, me("bob", "Bob")).await;
        let key = ConversationKey::between(&uid("alice"), &uid("bob"));

        alice.select(&user("bob", "Bob")).await.unwrap();
        for text in ["first", "second"] {
            alice.set_input(text);
            alice.send().await.unwrap();
        }

        settle(&mut bob).await;
        let entry = bob
            .roster()
            .into_iter()
            .find(|e| e.counterpart.id == uid("alice"))
            .unwrap();
        assert_eq!(entry.unread_count, 2);
        assert_eq!(entry.last_message.unwrap().content, "second");

        bob.select(&user("alice", "Alice")).await.unwrap();
        let observer = store.connect(uid("bob")).unwrap();
        assert_eq!(observer.read_unread(&key, &uid("bob")).await.unwrap(), 0);
        assert_eq!(bob.messages().len(), 2);
    }

    #[tokio::test]
    async fn editing_own_message_keeps_id_and_skips_unread() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        let key = ConversationKey::between(&uid("alice"), &uid("bob"));
        let observer = store.connect(uid("bob")).unwrap();

        alice.select(&user("bob", "Bob")).await.unwrap();
        alice.set_input("Closing on Fridy");
        alice.send().await.unwrap();
        settle(&mut alice).await;
        let id = alice.messages()[0].id;

        assert!(alice.stage_edit(id));
        assert_eq!(alice.input(), "Closing on Fridy");
        assert_eq!(alice.editing(), Some(id));

        alice.set_input("Closing on Friday");
        alice.send().await.unwrap();
        assert_eq!(alice.editing(), None);
        settle(&mut alice).await;

        let edited = &alice.messages()[0];
        assert_eq!(alice.messages().len(), 1);
        assert_eq!(edited.id, id);
        assert_eq!(edited.content, "Closing on Friday");
        assert!(edited.edited);
        assert_eq!(observer.read_unread(&key, &uid("bob")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn staging_an_edit_on_someone_elses_message_is_ignored() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        let (mut bob, _bob_events) = mount(&store, me("bob", "Bob")).await;

        bob.select(&user("alice", "Alice")).await.unwrap();
        bob.set_input("Can you send the disclosure?");
        bob.send().await.unwrap();

        alice.select(&user("bob", "Bob")).await.unwrap();
        alice.set_input("draft reply");
        let theirs = alice.messages()[0].id;

        assert!(!alice.stage_edit(theirs));
        assert_eq!(alice.input(), "draft reply");
        assert_eq!(alice.editing(), None);
        assert!(!alice.delete(theirs).await.unwrap());
        assert_eq!(alice.messages().len(), 1);
    }

    #[tokio::test]
    async fn cancel_edit_leaves_the_store_untouched() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        alice.select(&user("bob", "Bob")).await.unwrap();
        alice.set_input("keep me");
        alice.send().await.unwrap();
        settle(&mut alice).await;

        let id = alice.messages()[0].id;
        assert!(alice.stage_edit(id));
        alice.cancel_edit();
        assert_eq!(alice.input(), "");
        assert_eq!(alice.editing(), None);

        settle(&mut alice).await;
        assert_eq!(alice.messages()[0].content, "keep me");
        assert!(!alice.messages()[0].edited);
    }

    #[tokio::test]
    async fn delete_removes_only_the_target() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        alice.select(&user("bob", "Bob")).await.unwrap();
        for text in ["one", "two", "three"] {
            alice.set_input(text);
            alice.send().await.unwrap();
        }
        settle(&mut alice).await;

        let before: Vec<MessageId> = alice.messages().iter().map(|m| m.id).collect();
        assert!(alice.stage_edit(before[1]));
        assert!(alice.delete(before[1]).await.unwrap());
        assert_eq!(alice.editing(), None);
        settle(&mut alice).await;

        let after: Vec<MessageId> = alice.messages().iter().map(|m| m.id).collect();
        assert_eq!(after, vec![before[0], before[2]]);
    }

    #[tokio::test]
    async fn switching_conversations_keeps_one_log_feed() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        assert_eq!(store.live_feeds(), 2);

        alice.select(&user("bob", "Bob")).await.unwrap();
        assert_eq!(store.live_feeds(), 4);

        alice.select(&user("carol", "Carol")).await.unwrap();
        assert_eq!(store.live_feeds(), 4);

        alice.deselect();
        assert_eq!(store.live_feeds(), 2);
        assert_eq!(alice.view(), &ViewState::NoSelection);

        alice.unmount().await;
        assert_eq!(store.live_feeds(), 0);
    }

    #[tokio::test]
    async fn presence_follows_the_counterpart() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        alice.select(&user("bob", "Bob")).await.unwrap();
        assert!(!alice.counterpart_online());

        let (bob, _bob_events) = mount(&store, me("bob", "Bob")).await;
        settle(&mut alice).await;
        assert!(alice.counterpart_online());

        bob.unmount().await;
        settle(&mut alice).await;
        assert!(!alice.counterpart_online());
    }

    #[tokio::test]
    async fn roster_orders_recent_conversations_first() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        let (mut carol, _carol_events) = mount(&store, me("carol", "Carol")).await;

        let names: Vec<String> = alice.roster().into_iter().map(|e| e.counterpart.name).collect();
        assert_eq!(names, ["Bob", "Carol"]);

        carol.select(&user("alice", "Alice")).await.unwrap();
        carol.set_input("New listing on Oak Ave");
        carol.send().await.unwrap();

        settle(&mut alice).await;
        let roster = alice.roster();
        assert_eq!(roster[0].counterpart.name, "Carol");
        assert_eq!(roster[0].unread_count, 1);
        assert_eq!(roster[1].counterpart.name, "Bob");
        assert!(roster[1].last_message.is_none());
    }

    #[tokio::test]
    async fn empty_input_and_missing_selection_are_rejected() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;

        alice.set_input("hello");
        assert!(matches!(alice.send().await, Err(ClientError::NoSelection)));

        alice.select(&user("bob", "Bob")).await.unwrap();
        alice.set_input("   ");
        assert!(matches!(alice.send().await, Err(ClientError::EmptyMessage)));
    }

    #[tokio::test]
    async fn no_identity_disables_messaging() {
        let store = store();
        let (events, _rx) = EventSink::channel();
        let mut controller =
            ChatController::mount(&store, None, &directory(), IncrementMode::Atomic, events)
                .await
                .unwrap();

        assert!(matches!(
            controller.select(&user("bob", "Bob")).await,
            Err(ClientError::NoIdentity)
        ));
        assert!(controller.roster().is_empty());
        assert_eq!(controller.next_update().await, None);
        assert_eq!(store.live_feeds(), 0);
    }

    struct DownDirectory;

    impl Directory for DownDirectory {
        fn list_users(
            &self,
        ) -> impl std::future::Future<Output = Result<Vec<User>, ClientError>> + Send {
            async { Err(ClientError::Directory("503 Service Unavailable".into())) }
        }
    }

    #[tokio::test]
    async fn directory_failure_is_not_fatal() {
        let store = store();
        let (events, mut rx) = EventSink::channel();
        let controller = ChatController::mount(
            &store,
            Some(me("alice", "Alice")),
            &DownDirectory,
            IncrementMode::Atomic,
            events,
        )
        .await
        .unwrap();

        assert!(controller.roster().is_empty());
        assert_eq!(notices(&drain(&mut rx)), 1);
    }

    #[tokio::test]
    async fn store_failure_keeps_input_and_surfaces_notices() {
        let store = store();
        let (mut alice, mut events) = mount(&store, me("alice", "Alice")).await;
        alice.select(&user("bob", "Bob")).await.unwrap();
        drain(&mut events);

        store.shutdown();

        alice.set_input("are you there?");
        assert!(matches!(
            alice.send().await,
            Err(ClientError::Store(StoreError::Closed))
        ));
        assert_eq!(alice.input(), "are you there?");
        assert_eq!(notices(&drain(&mut events)), 1);

        settle(&mut alice).await;
        assert!(alice.is_stale());
        let events = drain(&mut events);
        assert!(events.contains(&ChatEvent::FeedLost {
            feed: Feed::Conversation
        }));
        // One staleness notice, however many feeds ended.
        assert_eq!(notices(&events), 1);
        assert_eq!(alice.next_update().await, None);
    }

    fn warnings(events: &[ChatEvent]) -> usize {
        events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ChatEvent::Notice(crate::events::Notice {
                        level: NoticeLevel::Warning,
                        ..
                    })
                )
            })
            .count()
    }

    #[tokio::test]
    async fn send_succeeds_when_the_unread_bump_fails() {
        let store = store();
        let (mut alice, mut events) = mount(&store, me("alice", "Alice")).await;
        let bob = store.connect(uid("bob")).unwrap();
        let key = ConversationKey::between(&uid("alice"), &uid("bob"));

        // A saturated counter makes the atomic increment fail after the append.
        bob.write_unread(&key, &uid("bob"), u32::MAX).await.unwrap();
        alice.select(&user("bob", "Bob")).await.unwrap();
        settle(&mut alice).await;
        drain(&mut events);

        alice.set_input("Inspection moved to 2pm");
        alice.send().await.unwrap();
        assert_eq!(alice.input(), "");

        settle(&mut alice).await;
        assert_eq!(alice.messages().len(), 1);
        assert_eq!(alice.messages()[0].content, "Inspection moved to 2pm");
        assert_eq!(bob.read_unread(&key, &uid("bob")).await.unwrap(), u32::MAX);

        let events = drain(&mut events);
        assert_eq!(notices(&events), 1);
        assert_eq!(warnings(&events), 1);
    }

    #[tokio::test]
    async fn staged_edit_of_a_deleted_message_is_dropped() {
        let store = store();
        let (mut alice, mut events) = mount(&store, me("alice", "Alice")).await;
        let other_tab = store.connect(uid("alice")).unwrap();
        let key = ConversationKey::between(&uid("alice"), &uid("bob"));

        alice.select(&user("bob", "Bob")).await.unwrap();
        alice.set_input("Price drop on Maple Ct");
        alice.send().await.unwrap();
        settle(&mut alice).await;
        let id = alice.messages()[0].id;

        assert!(alice.stage_edit(id));
        alice.set_input("Price drop on Maple Ct, now 410k");
        assert!(other_tab.remove(&key, id).await.unwrap());
        settle(&mut alice).await;
        assert!(alice.messages().is_empty());
        drain(&mut events);

        assert!(matches!(alice.send().await, Err(ClientError::EditTargetGone)));
        assert_eq!(alice.editing(), None);
        assert_eq!(alice.input(), "Price drop on Maple Ct, now 410k");
        assert_eq!(notices(&drain(&mut events)), 1);

        settle(&mut alice).await;
        assert!(alice.messages().is_empty());
        assert!(other_tab.messages(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_reopens_lost_feeds() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        alice.select(&user("bob", "Bob")).await.unwrap();

        // Simulate one dropped feed.
        let lost = alice.log_feed.take();
        drop(lost);
        alice.stale = true;

        alice.refresh_feeds().unwrap();
        assert!(!alice.is_stale());
        assert!(alice.log_feed.is_some());

        alice.set_input("back online");
        alice.send().await.unwrap();
        settle(&mut alice).await;
        assert_eq!(alice.messages().len(), 1);
    }

    #[tokio::test]
    async fn day_groups_render_dividers() {
        let store = store();
        let (mut alice, _events) = mount(&store, me("alice", "Alice")).await;
        alice.select(&user("bob", "Bob")).await.unwrap();
        alice.set_input("morning");
        alice.send().await.unwrap();
        settle(&mut alice).await;

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let groups = alice.day_groups(&Utc, now);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, "Today");
        assert_eq!(alice.message_time(&groups[0].messages[0], &Utc), "09:00");
    }
}
