//! Event broadcasting infrastructure for the Chatter server.
//!
//! Every server-originated event is published once on a tokio broadcast
//! channel as an [`Envelope`]: the [`ServerEvent`] plus a [`Target`] naming
//! which sessions should deliver it. Each connected session holds its own
//! receiver and drops envelopes that are not addressed to it.
//!
//! # Architecture
//!
//! - [`EventBroadcaster`] - cloneable handle that publishes envelopes
//! - [`Target`] - addressing: everyone, everyone but one session, or one session
//!
//! # Example
//!
//! ```rust
//! use chatter_server::broadcast::{Envelope, EventBroadcaster, Target};
//! use chatter_server::registry::SessionId;
//! use chatter_server::types::ServerEvent;
//!
//! let broadcaster = EventBroadcaster::new();
//! let mut rx = broadcaster.subscribe();
//!
//! let sender = SessionId::new();
//! broadcaster.broadcast(Envelope::new(
//!     Target::AllExcept(sender),
//!     ServerEvent::FeedbackCheck("alice is typing".into()),
//! ));
//!
//! let envelope = rx.try_recv().unwrap();
//! assert!(!envelope.target.matches(sender));
//! assert!(envelope.target.matches(SessionId::new()));
//! ```

use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};

use crate::registry::SessionId;
use crate::types::ServerEvent;

/// Default channel capacity.
///
/// Receivers that fall more than this many envelopes behind observe
/// `RecvError::Lagged` and skip ahead.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// The sessions an envelope is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every connected session.
    All,
    /// Every connected session except the given one.
    AllExcept(SessionId),
    /// Only the given session.
    Only(SessionId),
}

impl Target {
    /// Checks if a session should deliver an envelope with this target.
    pub fn matches(&self, session: SessionId) -> bool {
        match self {
            Self::All => true,
            Self::AllExcept(excluded) => *excluded != session,
            Self::Only(recipient) => *recipient == session,
        }
    }
}

/// A server event together with its addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub target: Target,
    pub event: ServerEvent,
}

impl Envelope {
    pub fn new(target: Target, event: ServerEvent) -> Self {
        Self { target, event }
    }

    /// An envelope for every connected session.
    pub fn to_all(event: ServerEvent) -> Self {
        Self::new(Target::All, event)
    }
}

/// Publishes [`Envelope`]s to every subscribed session.
///
/// `EventBroadcaster` is `Clone`, `Send` and `Sync`; clones share the same
/// channel. Publishing never blocks: when the channel is full the oldest
/// envelope is dropped and slow receivers lag.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: Sender<Envelope>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broadcaster with the given channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created event broadcaster");
        Self { sender }
    }

    /// Subscribes to envelopes published after this call.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Envelope> {
        let rx = self.sender.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New subscriber added"
        );
        rx
    }

    /// Publishes an envelope.
    ///
    /// Returns the number of receivers the envelope was queued for, or 0
    /// when nobody is subscribed.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        trace!(
            event = envelope.event.name(),
            target = ?envelope.target,
            "Broadcasting event"
        );

        match self.sender.send(envelope) {
            Ok(receivers) => receivers,
            Err(_) => {
                // No receivers; the last session may have just left.
                trace!("No active subscribers to receive event");
                0
            }
        }
    }

    /// Current number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(text: &str) -> ServerEvent {
        ServerEvent::FeedbackCheck(text.to_string())
    }

    #[test]
    fn target_all_matches_everyone() {
        assert!(Target::All.matches(SessionId::new()));
    }

    #[test]
    fn target_all_except_skips_only_the_excluded_session() {
        let excluded = SessionId::new();
        let other = SessionId::new();
        let target = Target::AllExcept(excluded);

        assert!(!target.matches(excluded));
        assert!(target.matches(other));
    }

    #[test]
    fn target_only_matches_one_session() {
        let recipient = SessionId::new();
        let target = Target::Only(recipient);

        assert!(target.matches(recipient));
        assert!(!target.matches(SessionId::new()));
    }

    #[test]
    fn broadcaster_subscriber_count_tracks_receivers() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);

        let rx1 = broadcaster.subscribe();
        let _rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[test]
    fn broadcaster_broadcast_returns_zero_with_no_subscribers() {
        let broadcaster = EventBroadcaster::with_capacity(8);
        assert_eq!(broadcaster.broadcast(Envelope::to_all(feedback("x"))), 0);
    }

    #[tokio::test]
    async fn broadcaster_delivers_to_every_subscriber() {
        let broadcaster = EventBroadcaster::new();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        let envelope = Envelope::to_all(ServerEvent::ClientsTotal(2));
        assert_eq!(broadcaster.broadcast(envelope.clone()), 2);

        assert_eq!(rx1.recv().await.unwrap(), envelope);
        assert_eq!(rx2.recv().await.unwrap(), envelope);
    }

    #[tokio::test]
    async fn broadcaster_preserves_publish_order() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        for n in 1..=3 {
            broadcaster.broadcast(Envelope::to_all(ServerEvent::ClientsTotal(n)));
        }

        for n in 1..=3 {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(envelope.event, ServerEvent::ClientsTotal(n));
        }
    }

    #[tokio::test]
    async fn broadcaster_clones_share_the_channel() {
        let broadcaster = EventBroadcaster::new();
        let clone = broadcaster.clone();
        let mut rx = broadcaster.subscribe();

        clone.broadcast(Envelope::to_all(feedback("from clone")));
        assert_eq!(rx.recv().await.unwrap().event, feedback("from clone"));
    }
}
