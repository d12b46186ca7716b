//! Presence tracking for the signed-in user.
//!
//! Going online registers a last-will write with the store that flips the
//! flag back to offline when the connection drops. That hook depends on the
//! store actually learning about the disconnect: if the process dies before
//! the transport reports it, the flag stays "online" indefinitely. Nothing
//! here expires stale presence; readers that care can look at
//! [`Presence::changed_at`](parley_store::Presence).

use tracing::{info, warn};

use parley_shared::UserId;
use parley_store::{DisconnectAction, Result, Session, Subscription};

pub struct PresenceTracker<'a> {
    session: &'a Session,
}

impl<'a> PresenceTracker<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Publish `user` as online and arm the offline last-will. Arming is
    /// best-effort: a failure is logged and the user is still marked online.
    pub async fn mark_online(&self, user: &UserId) -> Result<()> {
        let will = DisconnectAction::SetPresence {
            user: user.clone(),
            online: false,
        };
        if let Err(e) = self.session.on_disconnect(will).await {
            warn!(%user, error = %e, "could not register offline last-will");
        }
        self.session.set_presence(user, true).await?;
        info!(%user, "marked online");
        Ok(())
    }

    /// Publish `user` as offline now and disarm the last-will.
    pub async fn mark_offline(&self, user: &UserId) -> Result<()> {
        self.session.set_presence(user, false).await?;
        self.session.cancel_on_disconnect().await?;
        info!(%user, "marked offline");
        Ok(())
    }

    pub fn watch(&self, user: &UserId) -> Result<Subscription<bool>> {
        self.session.subscribe_presence(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::RealtimeStore;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[tokio::test]
    async fn online_then_graceful_offline() {
        let store = RealtimeStore::in_memory().unwrap();
        let alice = store.connect(uid("alice")).unwrap();
        let bob = store.connect(uid("bob")).unwrap();
        let mut seen = PresenceTracker::new(&bob).watch(&uid("alice")).unwrap();

        let tracker = PresenceTracker::new(&alice);
        tracker.mark_online(&uid("alice")).await.unwrap();
        assert_eq!(seen.next().await, Some(true));
        assert_eq!(store.pending_disconnect_actions(), 1);

        tracker.mark_offline(&uid("alice")).await.unwrap();
        assert_eq!(seen.next().await, Some(false));
        assert_eq!(store.pending_disconnect_actions(), 0);
    }

    #[tokio::test]
    async fn dropped_connection_goes_offline() {
        let store = RealtimeStore::in_memory().unwrap();
        let alice = store.connect(uid("alice")).unwrap();
        PresenceTracker::new(&alice)
            .mark_online(&uid("alice"))
            .await
            .unwrap();

        drop(alice);

        let bob = store.connect(uid("bob")).unwrap();
        assert!(!bob.presence(&uid("alice")).await.unwrap().unwrap().online);
    }

    #[tokio::test]
    async fn killed_process_stays_online() {
        let store = RealtimeStore::in_memory().unwrap();
        let alice = store.connect(uid("alice")).unwrap();
        PresenceTracker::new(&alice)
            .mark_online(&uid("alice"))
            .await
            .unwrap();

        alice.abandon();

        let bob = store.connect(uid("bob")).unwrap();
        assert!(bob.presence(&uid("alice")).await.unwrap().unwrap().online);
    }
}
