//! # parley-store
//!
//! The synchronized store behind direct messaging.
//!
//! Durable state lives in SQLite behind a [`Database`] handle that runs its
//! schema migrations on open and exposes typed helpers for the three trees the
//! chat layer uses: conversation logs, unread counters and presence flags.
//!
//! [`RealtimeStore`] wraps the database for concurrent writers. Each writer
//! connects as one user and gets a [`Session`]; every mutation goes through the
//! access rules, is stamped by the store clock, and republishes a full snapshot
//! to the live feeds ([`Subscription`]) watching the affected tree. Sessions
//! can register actions the store runs when the connection drops.

pub mod clock;
pub mod database;
pub mod feeds;
pub mod messages;
pub mod migrations;
pub mod presence;
pub mod realtime;
pub mod unreads;

mod error;
mod rules;

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use error::{Result, StoreError};
pub use feeds::{ChatTable, Subscription, UnreadTable};
pub use presence::Presence;
pub use realtime::{DisconnectAction, RealtimeStore, Session};
