//! Registry of connected realtime sessions.
//!
//! The registry is the single source of truth for the `clients-total` count.
//! It is owned by the [`Hub`](crate::hub::Hub) and shared by every connection
//! task, so it uses interior mutability with a [`RwLock`]. Locks are never
//! held across an `.await`.
//!
//! [`SessionRegistry::insert`] and [`SessionRegistry::remove`] hand the new
//! size to a callback that runs while the write lock is still held. Counts
//! published from that callback therefore go out in the same order the
//! registry changed.

use std::collections::HashSet;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use tracing::trace;
use uuid::Uuid;

/// Opaque identifier of one realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh, random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Set of currently connected sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashSet<SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session, runs `publish` with the new size under the write
    /// lock, and returns the new size.
    ///
    /// Inserting an id that is already present leaves the size unchanged.
    /// `publish` must not touch the registry.
    pub fn insert(&self, id: SessionId, publish: impl FnOnce(usize)) -> usize {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id);
        let total = sessions.len();
        trace!(session_id = %id, total, "Session registered");
        publish(total);
        total
    }

    /// Removes a session, runs `publish` with the new size under the write
    /// lock, and returns the new size.
    ///
    /// Removing an unknown id leaves the size unchanged.
    /// `publish` must not touch the registry.
    pub fn remove(&self, id: SessionId, publish: impl FnOnce(usize)) -> usize {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.remove(&id);
        let total = sessions.len();
        trace!(session_id = %id, total, "Session unregistered");
        publish(total);
        total
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn insert_and_remove_report_new_size() {
        let registry = SessionRegistry::new();
        let a = SessionId::new();
        let b = SessionId::new();

        assert_eq!(registry.insert(a, |_| {}), 1);
        assert_eq!(registry.insert(b, |_| {}), 2);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.remove(a, |_| {}), 1);
        assert_eq!(registry.remove(a, |_| {}), 1);
        assert_eq!(registry.remove(b, |_| {}), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_insert_and_unknown_remove_are_noops() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();

        assert_eq!(registry.insert(id, |_| {}), 1);
        assert_eq!(registry.insert(id, |_| {}), 1);
        assert_eq!(registry.remove(SessionId::new(), |_| {}), 1);
    }

    #[test]
    fn publish_sees_the_new_size() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        let mut seen = Vec::new();

        registry.insert(id, |total| seen.push(total));
        registry.insert(SessionId::new(), |total| seen.push(total));
        registry.remove(id, |total| seen.push(total));

        assert_eq!(seen, [1, 2, 1]);
    }

    #[test]
    fn concurrent_publishes_follow_registry_order() {
        let registry = Arc::new(SessionRegistry::new());
        let published = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let published = Arc::clone(&published);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let id = SessionId::new();
                        registry.insert(id, |total| published.lock().unwrap().push(total));
                        registry.remove(id, |total| published.lock().unwrap().push(total));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 1600);
        for pair in published.windows(2) {
            assert_eq!(pair[0].abs_diff(pair[1]), 1, "counts out of order: {pair:?}");
        }
        assert_eq!(published.last(), Some(&0));
    }

    #[test]
    fn concurrent_inserts_are_all_counted() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.insert(SessionId::new(), |_| {});
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 800);
    }

    #[test]
    fn debug_shows_count() {
        let registry = SessionRegistry::new();
        registry.insert(SessionId::new(), |_| {});
        assert_eq!(
            format!("{registry:?}"),
            "SessionRegistry { sessions: 1 }"
        );
    }
}
