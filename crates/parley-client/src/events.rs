//! Events the controller pushes to the view layer.

use serde::Serialize;
use tokio::sync::mpsc;

use parley_shared::UserId;

use crate::controller::Feed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient, non-blocking notification ("toast").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    /// The open conversation's message list was replaced.
    MessagesChanged { count: usize },
    /// Last messages or unread badges changed.
    RosterChanged,
    /// The open counterpart went online or offline.
    PresenceChanged { user: UserId, online: bool },
    /// The list just rendered its latest state; scroll to the newest message.
    ScrollToBottom,
    /// A live feed ended; what is shown may be stale.
    FeedLost { feed: Feed },
    Notice(Notice),
}

/// Sending side of the view's event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ChatEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(event = ?e.0, "Failed to emit event, view is gone");
        }
    }

    pub fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        self.emit(ChatEvent::Notice(Notice {
            level,
            text: text.into(),
        }));
    }
}
