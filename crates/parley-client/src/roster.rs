//! The conversation picker: every counterpart with their latest message and
//! unread badge.
//!
//! The roster is never stored. It is re-projected from the directory, the
//! message table and the unread table whenever either table changes.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use parley_shared::{Message, User, UserId};
use parley_store::ChatTable;

use crate::timeline;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub counterpart: User,
    pub last_message: Option<Message>,
    pub unread_count: u32,
}

/// Latest message of each of `me`'s conversations, keyed by counterpart.
pub fn last_messages(chats: &ChatTable, me: &UserId) -> HashMap<UserId, Message> {
    chats
        .iter()
        .filter_map(|(key, log)| {
            let counterpart = key.counterpart_of(me)?;
            let latest = log.iter().max_by(|a, b| timeline::compare(a, b))?;
            Some((counterpart, latest.clone()))
        })
        .collect()
}

/// Build the roster for `me`: recent conversations first (newest on top),
/// then everyone else alphabetically.
pub fn project(
    users: &[User],
    me: &UserId,
    last: &HashMap<UserId, Message>,
    unread: &HashMap<UserId, u32>,
) -> Vec<RosterEntry> {
    let mut entries: Vec<RosterEntry> = users
        .iter()
        .filter(|user| user.id != *me)
        .map(|user| RosterEntry {
            counterpart: user.clone(),
            last_message: last.get(&user.id).cloned(),
            unread_count: unread.get(&user.id).copied().unwrap_or(0),
        })
        .collect();

    entries.sort_by(compare_entries);
    entries
}

fn compare_entries(a: &RosterEntry, b: &RosterEntry) -> Ordering {
    match (&a.last_message, &b.last_message) {
        (Some(x), Some(y)) => timeline::compare(y, x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a
            .counterpart
            .name
            .cmp(&b.counterpart.name)
            .then_with(|| a.counterpart.id.cmp(&b.counterpart.id)),
    }
}
