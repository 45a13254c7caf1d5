//! # Synchronization Engine
//!
//! Accepts join/mutate/chat/cursor/detach operations from connection
//! handlers, updates the [`SessionRegistry`], and fans events out to the
//! other participants of the session.
//!
//! ## Ordering
//!
//! Every operation that touches a session runs its fan-out inside the
//! registry's critical section. Delivery is a non-blocking push onto each
//! recipient's unbounded outbound channel, so the section stays short, and
//! all recipients observe mutations of one session in the order the registry
//! applied them. In particular a joiner's snapshot is queued before the
//! joiner is added to the roster, so nothing broadcast afterwards can
//! overtake it.
//!
//! Lock order is always registry first, then the connection table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use board_core::{CanvasElement, ConnectionId, CursorState, SessionRegistry};
use tokio::sync::mpsc;

use crate::metrics::{
    dec_ws_connections, inc_ws_connections, record_dropped_event, record_fanout,
    set_active_sessions,
};
use crate::protocol::ServerMessage;

/// Lifecycle of one connection as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered but not in any session yet.
    Unattached,
    /// Member of the session with this key.
    Attached(String),
    /// Closed; terminal.
    Detached,
}

/// Result of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The session did not exist and was created by this join.
    pub created: bool,
    /// A snapshot of the existing canvas was queued for the joiner.
    pub snapshot_sent: bool,
    /// Roster size after the join.
    pub participants: usize,
}

/// Result of a detach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetachOutcome {
    /// Sessions the connection was removed from.
    pub left: Vec<String>,
    /// Sessions torn down because the roster became empty.
    pub removed: Vec<String>,
    /// `participant_left` notifications delivered.
    pub notified: usize,
}

#[derive(Debug)]
struct ConnectionHandle {
    sender: mpsc::UnboundedSender<ServerMessage>,
    state: ConnectionState,
}

type ConnectionTable = HashMap<ConnectionId, ConnectionHandle>;

/// Shared synchronization engine; clone freely across connection tasks.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    registry: SessionRegistry,
    connections: Arc<RwLock<ConnectionTable>>,
}

impl SyncEngine {
    /// Create an engine with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The session registry (read access for routes and health checks).
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn connections(&self) -> RwLockReadGuard<'_, ConnectionTable> {
        self.connections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn connections_mut(&self) -> RwLockWriteGuard<'_, ConnectionTable> {
        self.connections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a new connection.
    ///
    /// Returns the receiver for everything the engine sends to it.
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections_mut().insert(
            connection_id,
            ConnectionHandle {
                sender,
                state: ConnectionState::Unattached,
            },
        );
        inc_ws_connections();
        tracing::debug!(%connection_id, "Registered connection");
        receiver
    }

    /// Current lifecycle state of a connection.
    #[must_use]
    pub fn state(&self, connection_id: ConnectionId) -> ConnectionState {
        self.connections()
            .get(&connection_id)
            .map_or(ConnectionState::Detached, |h| h.state.clone())
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    fn set_state(&self, connection_id: ConnectionId, state: ConnectionState) {
        if let Some(handle) = self.connections_mut().get_mut(&connection_id) {
            handle.state = state;
        }
    }

    /// Queue a message for one connection. Returns whether it was queued.
    fn send_to(&self, connection_id: ConnectionId, message: ServerMessage) -> bool {
        self.connections()
            .get(&connection_id)
            .is_some_and(|h| h.sender.send(message).is_ok())
    }

    /// Queue a message for each recipient. Returns how many were queued.
    ///
    /// A recipient whose connection is gone is skipped; it never fails the
    /// sender's operation.
    fn deliver(
        &self,
        recipients: impl IntoIterator<Item = ConnectionId>,
        message: &ServerMessage,
    ) -> usize {
        let connections = self.connections();
        let mut delivered = 0;
        for id in recipients {
            match connections.get(&id) {
                Some(handle) if handle.sender.send(message.clone()).is_ok() => delivered += 1,
                _ => {
                    tracing::debug!(connection_id = %id, kind = message.kind(), "Fan-out to closed connection skipped");
                    record_dropped_event(message.kind(), "closed_recipient");
                }
            }
        }
        record_fanout(message.kind(), delivered);
        delivered
    }

    /// Attach a connection to a session, creating the session if needed.
    ///
    /// If the session already existed its current canvas is queued for the
    /// joiner before the joiner enters the roster. A connection attached to a
    /// different session leaves that one first. Rejoining the same session
    /// re-sends the snapshot without a second roster entry and takes the new
    /// display name.
    ///
    /// Returns `None` if the connection is not registered.
    pub fn join(
        &self,
        connection_id: ConnectionId,
        session_key: &str,
        display_name: &str,
    ) -> Option<JoinOutcome> {
        match self.state(connection_id) {
            ConnectionState::Detached => {
                tracing::warn!(%connection_id, "Join from unregistered connection ignored");
                return None;
            }
            ConnectionState::Attached(current) if current != session_key => {
                self.leave(connection_id, &current);
            }
            _ => {}
        }

        let outcome = self.registry.join_with(session_key, |session, created| {
            let snapshot_sent = !created
                && self.send_to(
                    connection_id,
                    ServerMessage::UpdateCanvas {
                        session_key: session_key.to_string(),
                        elements: session.elements().to_vec(),
                        background_color: session.background_color().to_string(),
                    },
                );
            if !session.presence_mut().rename(connection_id, display_name) {
                session.presence_mut().add(connection_id, display_name);
            }
            self.set_state(connection_id, ConnectionState::Attached(session_key.to_string()));
            JoinOutcome {
                created,
                snapshot_sent,
                participants: session.presence().len(),
            }
        });

        set_active_sessions(self.registry.len());
        tracing::info!(
            %connection_id,
            session_key = %session_key,
            display_name = %display_name,
            created = outcome.created,
            participants = outcome.participants,
            "Joined session"
        );
        Some(outcome)
    }

    /// Store the sender's full canvas state and relay it to everyone else.
    ///
    /// Dropped (returns `None`) when the session does not exist or the sender
    /// is not in it. Otherwise returns how many participants it reached. The
    /// sender gets no acknowledgement.
    pub fn mutate(
        &self,
        connection_id: ConnectionId,
        session_key: &str,
        elements: Vec<CanvasElement>,
        background_color: String,
    ) -> Option<usize> {
        let delivered = self
            .registry
            .update_with(session_key, |session| {
                if !session.presence().contains(connection_id) {
                    return None;
                }
                let message = ServerMessage::UpdateCanvas {
                    session_key: session_key.to_string(),
                    elements: elements.clone(),
                    background_color: background_color.clone(),
                };
                session.apply_snapshot(elements, background_color);
                Some(self.deliver(session.presence().others(connection_id), &message))
            })
            .flatten();
        self.note_routing_miss(delivered, connection_id, session_key, "update_canvas");
        delivered
    }

    /// Relay a chat line to everyone else in the session. Nothing is stored.
    pub fn chat(
        &self,
        connection_id: ConnectionId,
        session_key: &str,
        message: &str,
        display_name: &str,
    ) -> Option<usize> {
        let delivered = self
            .registry
            .update_with(session_key, |session| {
                if !session.presence().contains(connection_id) {
                    return None;
                }
                let relay = ServerMessage::Message {
                    session_key: session_key.to_string(),
                    message: message.to_string(),
                    display_name: display_name.to_string(),
                    sender_id: connection_id,
                };
                Some(self.deliver(session.presence().others(connection_id), &relay))
            })
            .flatten();
        self.note_routing_miss(delivered, connection_id, session_key, "send_message");
        delivered
    }

    /// Relay a pointer position to everyone else in the session. Never stored.
    pub fn cursor(
        &self,
        connection_id: ConnectionId,
        session_key: &str,
        x: f64,
        y: f64,
        display_name: &str,
    ) -> Option<usize> {
        let delivered = self
            .registry
            .update_with(session_key, |session| {
                if !session.presence().contains(connection_id) {
                    return None;
                }
                let relay = ServerMessage::from(CursorState {
                    connection_id,
                    display_name: display_name.to_string(),
                    x,
                    y,
                });
                Some(self.deliver(session.presence().others(connection_id), &relay))
            })
            .flatten();
        self.note_routing_miss(delivered, connection_id, session_key, "cursor_move");
        delivered
    }

    /// Queue a keep-alive ping for a connection.
    ///
    /// Only resets transport idle timers; it has no session semantics.
    pub fn keepalive(&self, connection_id: ConnectionId) -> bool {
        self.send_to(connection_id, ServerMessage::Ping)
    }

    /// Remove a connection from every session and forget it.
    ///
    /// Remaining participants get `participant_left`; sessions left empty
    /// are torn down. Calling it again for the same connection is a no-op.
    pub fn detach(&self, connection_id: ConnectionId) -> DetachOutcome {
        let mut outcome = DetachOutcome::default();
        for key in self.registry.sessions_containing(connection_id) {
            let (notified, removed) = self.leave(connection_id, &key);
            outcome.notified += notified;
            if removed {
                outcome.removed.push(key.clone());
            }
            outcome.left.push(key);
        }

        let was_registered = {
            let mut connections = self.connections_mut();
            connections.remove(&connection_id).is_some()
        };
        if was_registered {
            dec_ws_connections();
            tracing::info!(
                %connection_id,
                sessions_left = outcome.left.len(),
                sessions_removed = outcome.removed.len(),
                "Detached connection"
            );
        }
        outcome
    }

    /// Remove a connection from one session, notify the rest, and tear the
    /// session down if it is now empty.
    ///
    /// Returns (notifications delivered, session removed).
    fn leave(&self, connection_id: ConnectionId, session_key: &str) -> (usize, bool) {
        let (notified, removed) = self
            .registry
            .leave_with(session_key, |session| {
                if !session.presence_mut().remove(connection_id) {
                    return 0;
                }
                let remaining: Vec<ConnectionId> =
                    session.presence().iter().map(|p| p.connection_id).collect();
                self.deliver(
                    remaining,
                    &ServerMessage::ParticipantLeft {
                        sender_id: connection_id,
                    },
                )
            })
            .unwrap_or((0, false));
        self.set_state(connection_id, ConnectionState::Unattached);

        set_active_sessions(self.registry.len());
        tracing::debug!(%connection_id, session_key = %session_key, removed, "Left session");
        (notified, removed)
    }

    fn note_routing_miss(
        &self,
        delivered: Option<usize>,
        connection_id: ConnectionId,
        session_key: &str,
        kind: &'static str,
    ) {
        if delivered.is_none() {
            let reason = if self.registry.get(session_key).is_some() {
                "not_attached"
            } else {
                "unknown_session"
            };
            tracing::debug!(%connection_id, session_key = %session_key, kind, reason, "Event dropped");
            record_dropped_event(kind, reason);
        }
    }
}
