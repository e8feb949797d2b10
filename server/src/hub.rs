//! Realtime connection lifecycle.
//!
//! The [`Hub`] owns the [`SessionRegistry`], the [`EventBroadcaster`] and the
//! message store handle, and implements what happens when a session connects,
//! sends an event, and disconnects. It knows nothing about WebSockets; the
//! transport lives in [`routes`](crate::routes).
//!
//! # Lifecycle
//!
//! 1. [`Hub::connect`] subscribes the session, registers it, broadcasts the
//!    new `clients-total` to everyone (the new session included) and takes a
//!    sorted snapshot of the history
//! 2. [`Hub::dispatch`] handles each [`ClientEvent`]
//! 3. [`Hub::disconnect`] unregisters the session and broadcasts the new count
//!
//! Store failures never reach the client: they are logged and the triggering
//! event produces no broadcast.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tracing::{debug, error, info, warn};

use crate::broadcast::{Envelope, EventBroadcaster, Target};
use crate::registry::{SessionId, SessionRegistry};
use crate::store::{MessageStore, StoreError};
use crate::types::{ClientEvent, Message, NewMessage, ServerEvent};

/// A connected session as seen by the event loop.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    /// History sorted by creation time, taken once at connect.
    pub history: Vec<Message>,
}

/// The stream of events addressed to one session.
#[derive(Debug)]
pub struct SessionEvents {
    id: SessionId,
    rx: Receiver<Envelope>,
}

impl SessionEvents {
    /// Waits for the next event addressed to this session.
    ///
    /// Returns `None` once the broadcaster is gone. Envelopes lost to lag
    /// are skipped with a warning.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.target.matches(self.id) => {
                    return Some(envelope.event);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = %self.id, skipped, "Session lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next already-published event addressed to this session,
    /// without waiting.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) if envelope.target.matches(self.id) => {
                    return Some(envelope.event);
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Coordinates realtime sessions.
///
/// Cheap to clone; clones share the registry, channel and store.
#[derive(Clone)]
pub struct Hub {
    registry: Arc<SessionRegistry>,
    broadcaster: EventBroadcaster,
    messages: Arc<dyn MessageStore>,
}

impl Hub {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            broadcaster: EventBroadcaster::new(),
            messages,
        }
    }

    /// Publishes `clients-total` to every session.
    fn publish_total(&self, total: usize) {
        self.broadcaster
            .broadcast(Envelope::to_all(ServerEvent::ClientsTotal(total)));
    }

    /// Number of connected sessions.
    pub fn connections(&self) -> usize {
        self.registry.len()
    }

    /// Registers a new session.
    ///
    /// The returned [`SessionEvents`] is subscribed before the count is
    /// broadcast, so its first event is the `clients-total` that includes it.
    /// The count is published under the registry lock, so concurrent
    /// connects and disconnects are announced in the order they happened.
    pub async fn connect(&self) -> (Session, SessionEvents) {
        let id = SessionId::new();
        let rx = self.broadcaster.subscribe();

        let total = self.registry.insert(id, |total| self.publish_total(total));
        info!(session_id = %id, clients = total, "Client connected");

        let history = match self.messages.find_all_sorted().await {
            Ok(history) => history,
            Err(err) => {
                error!(session_id = %id, error = %err, "Failed to load message history");
                Vec::new()
            }
        };

        (Session { id, history }, SessionEvents { id, rx })
    }

    /// Handles one event from `session`.
    pub async fn dispatch(&self, session: &Session, event: ClientEvent) {
        debug!(session_id = %session.id, event = event.name(), "Client event");

        match event {
            ClientEvent::GetMessage => {
                self.broadcaster.broadcast(Envelope::new(
                    Target::Only(session.id),
                    ServerEvent::InitMessage(session.history.clone()),
                ));
            }
            ClientEvent::SendMessage(new) => {
                if let Err(err) = self.send_message(new).await {
                    match &err {
                        StoreError::Validation(_) => {
                            warn!(session_id = %session.id, error = %err, "Rejected message")
                        }
                        StoreError::Backend(_) => {
                            error!(session_id = %session.id, error = %err, "Failed to store message")
                        }
                    }
                }
            }
            ClientEvent::Feedback(text) => {
                self.broadcaster.broadcast(Envelope::new(
                    Target::AllExcept(session.id),
                    ServerEvent::FeedbackCheck(text),
                ));
            }
        }
    }

    /// Persists a message and broadcasts the whole collection.
    async fn send_message(&self, new: NewMessage) -> Result<(), StoreError> {
        let message = Message::create(new)?;
        let stored = self.messages.insert(message).await?;
        debug!(message_id = %stored.id, username = %stored.username, "Message accepted");

        let all = self.messages.find_all().await?;
        self.broadcaster
            .broadcast(Envelope::to_all(ServerEvent::ChatMessage(all)));
        Ok(())
    }

    /// Unregisters a session and tells the remaining sessions.
    ///
    /// Drop the session's [`SessionEvents`] first so it does not see its own
    /// departure.
    pub fn disconnect(&self, session: &Session) {
        let total = self
            .registry
            .remove(session.id, |total| self.publish_total(total));
        info!(session_id = %session.id, clients = total, "Client disconnected");
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("registry", &self.registry)
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}
