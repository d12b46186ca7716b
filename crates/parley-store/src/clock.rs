//! Server-side time source.
//!
//! Every timestamp in the store comes from the store's own clock, never from
//! the writer. The [`ServerClock`] wrapper truncates to millisecond precision
//! (what the database keeps) and never hands out the same instant twice, so
//! later writes always carry later timestamps even if the wall clock stalls or
//! steps backwards.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Strictly increasing millisecond timestamps drawn from a [`Clock`].
pub(crate) struct ServerClock {
    source: Arc<dyn Clock>,
    last_ms: i64,
}

impl ServerClock {
    pub(crate) fn new(source: Arc<dyn Clock>) -> Self {
        Self {
            source,
            last_ms: i64::MIN,
        }
    }

    pub(crate) fn next(&mut self) -> DateTime<Utc> {
        let now_ms = self.source.now().timestamp_millis();
        let ms = now_ms.max(self.last_ms.saturating_add(1));
        self.last_ms = ms;
        from_millis(ms)
    }
}

/// Convert stored unix millis back into a timestamp. Out-of-range values
/// clamp to the epoch.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}
