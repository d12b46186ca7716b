//! # parley-client
//!
//! Client side of direct messaging: typed adapters over a store session
//! (message log, unread counters, presence), the directory client, the
//! conversation roster, day grouping for display, and the
//! [`ChatController`](controller::ChatController) that drives one chat view.

pub mod config;
pub mod controller;
pub mod directory;
pub mod error;
pub mod events;
pub mod logging;
pub mod message_log;
pub mod presence;
pub mod roster;
pub mod timeline;
pub mod unread;

pub use config::ChatConfig;
pub use controller::{ChatController, Feed, Update, ViewState};
pub use directory::{Directory, HttpDirectory, StaticDirectory};
pub use error::ClientError;
pub use events::{ChatEvent, EventSink, Notice, NoticeLevel};
pub use roster::RosterEntry;
pub use unread::IncrementMode;
