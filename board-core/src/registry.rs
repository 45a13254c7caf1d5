//! In-memory directory of live sessions.
//!
//! [`SessionRegistry`] is the sole owner of [`Session`] records. Callers get
//! clones for reads and closures for writes; every write runs inside one
//! critical section on the registry lock, so a join racing a teardown of the
//! same key is never lost.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::presence::ConnectionId;
use crate::session::Session;

/// Thread-safe session directory shared by every connection handler.
///
/// # Example
///
/// ```
/// use board_core::{ConnectionId, SessionRegistry};
///
/// let registry = SessionRegistry::new();
/// let alice = ConnectionId::new();
///
/// registry.join_with("room-1", |session, created| {
///     assert!(created);
///     session.presence_mut().add(alice, "Alice");
/// });
/// assert_eq!(registry.len(), 1);
///
/// let (_, removed) = registry
///     .leave_with("room-1", |session| session.presence_mut().remove(alice))
///     .unwrap();
/// assert!(removed);
/// assert!(registry.get("room-1").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get the session for `key`, creating an empty one if it does not exist.
    #[must_use]
    pub fn find_or_create(&self, key: &str) -> Session {
        self.write()
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key))
            .clone()
    }

    /// Get a session without creating it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Session> {
        self.read().get(key).cloned()
    }

    /// Find or create the session for `key` and run `f` on it under the lock.
    ///
    /// `f` receives whether the session was created by this call.
    pub fn join_with<R>(&self, key: &str, f: impl FnOnce(&mut Session, bool) -> R) -> R {
        let mut sessions = self.write();
        let created = !sessions.contains_key(key);
        let session = sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key));
        if created {
            tracing::debug!(session_key = %key, "Created session");
        }
        f(session, created)
    }

    /// Run `f` on an existing session under the lock.
    ///
    /// Returns `None` without calling `f` if the session does not exist.
    pub fn update_with<R>(&self, key: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.write().get_mut(key).map(f)
    }

    /// Run `f` on an existing session, then delete it if its roster is empty.
    ///
    /// Both steps share one write-lock section, so no join can attach to a
    /// session between its last departure and its removal. Returns `f`'s
    /// result and whether the session was removed, or `None` if it does not
    /// exist.
    pub fn leave_with<R>(&self, key: &str, f: impl FnOnce(&mut Session) -> R) -> Option<(R, bool)> {
        let mut sessions = self.write();
        let session = sessions.get_mut(key)?;
        let result = f(session);
        let removed = session.presence().is_empty();
        if removed {
            sessions.remove(key);
            tracing::debug!(session_key = %key, "Removed empty session");
        }
        Some((result, removed))
    }

    /// Delete the session iff its roster is empty.
    ///
    /// Emptiness is checked under the write lock, so a participant who joined
    /// after the last departure keeps the session alive. Returns whether the
    /// session was removed.
    pub fn remove_if_empty(&self, key: &str) -> bool {
        let mut sessions = self.write();
        let empty = sessions
            .get(key)
            .is_some_and(|session| session.presence().is_empty());
        if empty {
            sessions.remove(key);
            tracing::debug!(session_key = %key, "Removed empty session");
        }
        empty
    }

    /// Keys of every session whose roster contains `connection_id`.
    #[must_use]
    pub fn sessions_containing(&self, connection_id: ConnectionId) -> Vec<String> {
        self.read()
            .values()
            .filter(|session| session.presence().contains(connection_id))
            .map(|session| session.key().to_string())
            .collect()
    }

    /// Keys of all live sessions.
    #[must_use]
    pub fn session_keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether there are no live sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Total participants across all sessions.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.read().values().map(|s| s.presence().len()).sum()
    }
}
