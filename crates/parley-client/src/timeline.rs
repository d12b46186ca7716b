//! Display ordering and day grouping for a conversation.
//!
//! Everything here is pure: the time zone and "now" are passed in so the same
//! snapshot renders identically for every caller.

use std::cmp::Ordering;
use std::fmt::Display;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use parley_shared::Message;

/// Display order: oldest first, ties broken by message id so every client
/// renders same-instant messages identically.
pub fn compare(a: &Message, b: &Message) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.id.cmp(&b.id))
}

pub fn order(messages: &mut [Message]) {
    messages.sort_by(compare);
}

/// Messages sharing one local calendar day, headed by a divider label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    pub day: NaiveDate,
    pub label: String,
    pub messages: Vec<Message>,
}

/// Split `messages` into runs of the same local day. A new group starts
/// whenever a message's day differs from the one before it.
pub fn group_by_day<Tz>(messages: &[Message], tz: &Tz, now: DateTime<Utc>) -> Vec<DayGroup>
where
    Tz: TimeZone,
{
    let today = local_day(now, tz);
    let mut groups: Vec<DayGroup> = Vec::new();

    for message in messages {
        let day = local_day(message.timestamp, tz);
        match groups.last_mut() {
            Some(group) if group.day == day => group.messages.push(message.clone()),
            _ => groups.push(DayGroup {
                day,
                label: day_label(day, today),
                messages: vec![message.clone()],
            }),
        }
    }

    groups
}

/// `Today`, `Yesterday`, or e.g. `Monday, January 1, 2024`.
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if Some(day) == today.pred_opt() {
        "Yesterday".to_string()
    } else {
        day.format("%A, %B %-d, %Y").to_string()
    }
}

/// `HH:MM` in local time.
pub fn time_of_day<Tz>(at: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.with_timezone(tz).format("%H:%M").to_string()
}

/// Roster preview label: time today, `Yesterday`, or e.g. `Jan 1`.
pub fn preview_label<Tz>(at: DateTime<Utc>, tz: &Tz, now: DateTime<Utc>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let day = local_day(at, tz);
    let today = local_day(now, tz);
    if day == today {
        time_of_day(at, tz)
    } else if Some(day) == today.pred_opt() {
        "Yesterday".to_string()
    } else {
        day.format("%b %-d").to_string()
    }
}

fn local_day<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}
