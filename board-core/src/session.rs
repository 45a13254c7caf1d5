//! A live drawing session: latest canvas state plus its presence roster.

use serde::{Deserialize, Serialize};

use crate::current_timestamp_ms;
use crate::element::CanvasElement;
use crate::presence::Presence;

/// Background color of a freshly created session.
pub const DEFAULT_BACKGROUND: &str = "#121212";

/// Full canvas state: the complete element sequence and background color.
///
/// This is the unit of synchronization; every mutation carries one and
/// replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    /// Ordered element sequence.
    pub elements: Vec<CanvasElement>,
    /// Canvas background color.
    pub background_color: String,
}

impl Default for CanvasSnapshot {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            background_color: DEFAULT_BACKGROUND.to_string(),
        }
    }
}

/// One collaborative canvas, keyed by an opaque session key.
#[derive(Debug, Clone)]
pub struct Session {
    key: String,
    canvas: CanvasSnapshot,
    presence: Presence,
    created_at: u64,
    revision: u64,
}

impl Session {
    /// Create an empty session with the default background and no participants.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            canvas: CanvasSnapshot::default(),
            presence: Presence::new(),
            created_at: current_timestamp_ms(),
            revision: 0,
        }
    }

    /// The session key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Latest element sequence.
    #[must_use]
    pub fn elements(&self) -> &[CanvasElement] {
        &self.canvas.elements
    }

    /// Latest background color.
    #[must_use]
    pub fn background_color(&self) -> &str {
        &self.canvas.background_color
    }

    /// Clone of the current canvas state.
    #[must_use]
    pub fn snapshot(&self) -> CanvasSnapshot {
        self.canvas.clone()
    }

    /// Participant roster.
    #[must_use]
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Mutable roster access for join/leave bookkeeping.
    pub fn presence_mut(&mut self) -> &mut Presence {
        &mut self.presence
    }

    /// Creation time (Unix milliseconds).
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Number of snapshots applied since creation.
    ///
    /// Informational only; it does not order concurrent writers.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the element sequence and background with a sender's full state.
    ///
    /// Last writer wins at the granularity of the whole sequence; there is no
    /// per-element merge. Elements are stored without validation.
    pub fn apply_snapshot(&mut self, elements: Vec<CanvasElement>, background_color: String) {
        self.canvas = CanvasSnapshot {
            elements,
            background_color,
        };
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Point;
    use proptest::prelude::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new("abc");
        assert_eq!(session.key(), "abc");
        assert!(session.elements().is_empty());
        assert_eq!(session.background_color(), DEFAULT_BACKGROUND);
        assert!(session.presence().is_empty());
        assert_eq!(session.revision(), 0);
    }

    #[test]
    fn test_apply_snapshot_replaces_everything() {
        let mut session = Session::new("abc");
        session.apply_snapshot(
            vec![
                CanvasElement::pencil(Point::new(0.0, 0.0), "#fff", 2.0),
                CanvasElement::pencil(Point::new(5.0, 5.0), "#fff", 2.0),
            ],
            "#ffffff".to_string(),
        );
        session.apply_snapshot(
            vec![CanvasElement::text(Point::new(1.0, 1.0), "t", "#000", 12.0, false)],
            "#000000".to_string(),
        );

        assert_eq!(session.elements().len(), 1);
        assert_eq!(session.background_color(), "#000000");
        assert_eq!(session.revision(), 2);
    }

    proptest! {
        #[test]
        fn apply_snapshot_is_idempotent(
            points in proptest::collection::vec((-1e4f64..1e4, -1e4f64..1e4), 0..16),
            color in "#[0-9a-f]{6}",
        ) {
            let elements: Vec<CanvasElement> = points
                .iter()
                .map(|(x, y)| CanvasElement::pencil(Point::new(*x, *y), "#fff", 1.0))
                .collect();

            let mut once = Session::new("k");
            once.apply_snapshot(elements.clone(), color.clone());

            let mut twice = Session::new("k");
            twice.apply_snapshot(elements.clone(), color.clone());
            twice.apply_snapshot(elements, color);

            prop_assert_eq!(once.snapshot(), twice.snapshot());
        }
    }
}
