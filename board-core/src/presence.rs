//! Presence roster - who is attached to a session right now.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::current_timestamp_ms;

/// Display name used when a participant does not choose one.
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Maximum display name length in characters; longer names are truncated.
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Identifier of one live connection.
///
/// Unique per connection and not stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new unique connection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a client-chosen display name.
///
/// Trims whitespace, substitutes [`DEFAULT_DISPLAY_NAME`] for empty names and
/// truncates to [`MAX_DISPLAY_NAME_CHARS`]. Names are not unique.
#[must_use]
pub fn normalize_display_name(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.chars().take(MAX_DISPLAY_NAME_CHARS).collect(),
        _ => DEFAULT_DISPLAY_NAME.to_string(),
    }
}

/// A connection attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    /// Connection identity.
    pub connection_id: ConnectionId,
    /// Free-text display name.
    pub display_name: String,
    /// Join time (Unix milliseconds).
    pub joined_at: u64,
}

/// Last reported pointer position of a participant.
///
/// Only ever lives on the broadcast path; sessions never store it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    /// Whose cursor this is.
    pub connection_id: ConnectionId,
    /// Name to label the cursor with.
    pub display_name: String,
    /// Pointer X.
    pub x: f64,
    /// Pointer Y.
    pub y: f64,
}

/// Roster of participants in append order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Presence {
    participants: Vec<Participant>,
}

impl Presence {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a participant. Display names are not deduplicated.
    pub fn add(&mut self, connection_id: ConnectionId, display_name: impl Into<String>) {
        self.participants.push(Participant {
            connection_id,
            display_name: display_name.into(),
            joined_at: current_timestamp_ms(),
        });
    }

    /// Remove a participant by connection id.
    ///
    /// Returns whether the id was present.
    pub fn remove(&mut self, connection_id: ConnectionId) -> bool {
        let before = self.participants.len();
        self.participants
            .retain(|p| p.connection_id != connection_id);
        self.participants.len() != before
    }

    /// Replace a participant's display name, keeping its roster position.
    ///
    /// Returns whether the id was present.
    pub fn rename(&mut self, connection_id: ConnectionId, display_name: impl Into<String>) -> bool {
        match self
            .participants
            .iter_mut()
            .find(|p| p.connection_id == connection_id)
        {
            Some(participant) => {
                participant.display_name = display_name.into();
                true
            }
            None => false,
        }
    }

    /// Whether a connection is on the roster.
    #[must_use]
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.participants
            .iter()
            .any(|p| p.connection_id == connection_id)
    }

    /// Look up a participant.
    #[must_use]
    pub fn get(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    /// Number of attached participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether no one is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Iterate participants in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// Broadcast recipients for an event from `sender`: everyone but the sender.
    pub fn others(&self, sender: ConnectionId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.participants
            .iter()
            .map(|p| p.connection_id)
            .filter(move |id| *id != sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_add_keeps_append_order() {
        let mut presence = Presence::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        presence.add(a, "Ann");
        presence.add(b, "Ann");

        let ids: Vec<_> = presence.iter().map(|p| p.connection_id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(presence.len(), 2);
    }

    #[test]
    fn test_remove_reports_presence() {
        let mut presence = Presence::new();
        let a = ConnectionId::new();
        presence.add(a, "Ann");

        assert!(presence.remove(a));
        assert!(!presence.remove(a));
        assert!(presence.is_empty());
    }

    #[test]
    fn test_rename_keeps_position() {
        let mut presence = Presence::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        presence.add(a, "Ann");
        presence.add(b, "Bob");

        assert!(presence.rename(a, "Annie"));
        assert!(!presence.rename(ConnectionId::new(), "Ghost"));

        let names: Vec<_> = presence.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["Annie", "Bob"]);
        assert_eq!(presence.len(), 2);
    }

    #[test]
    fn test_others_excludes_sender() {
        let mut presence = Presence::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        presence.add(a, "A");
        presence.add(b, "B");
        presence.add(c, "C");

        let recipients: Vec<_> = presence.others(b).collect();
        assert_eq!(recipients, vec![a, c]);
    }

    #[test]
    fn test_normalize_display_name() {
        assert_eq!(normalize_display_name(None), DEFAULT_DISPLAY_NAME);
        assert_eq!(normalize_display_name(Some("   ")), DEFAULT_DISPLAY_NAME);
        assert_eq!(normalize_display_name(Some("  Bo ")), "Bo");
        let long = "x".repeat(200);
        assert_eq!(
            normalize_display_name(Some(&long)).chars().count(),
            MAX_DISPLAY_NAME_CHARS
        );
    }

    #[test]
    fn test_connection_id_serializes_as_string() {
        let id = ConnectionId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{id}\""));
    }

    proptest! {
        /// Roster size always equals the number of distinct ids currently attached.
        #[test]
        fn roster_tracks_attached_ids(ops in proptest::collection::vec((any::<bool>(), 0usize..6), 0..64)) {
            let ids: Vec<ConnectionId> = (0..6).map(|_| ConnectionId::new()).collect();
            let mut presence = Presence::new();
            let mut attached = HashSet::new();

            for (join, idx) in ops {
                let id = ids[idx];
                if join {
                    // A connection joins at most once; the engine dedups rejoins.
                    if attached.insert(id) {
                        presence.add(id, "p");
                    }
                } else {
                    let removed = presence.remove(id);
                    prop_assert_eq!(removed, attached.remove(&id));
                }
                prop_assert_eq!(presence.len(), attached.len());
            }
        }
    }
}
