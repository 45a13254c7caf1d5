//! # Wire Protocol
//!
//! JSON text frames tagged by `type`.
//!
//! ### Client -> Server
//!
//! - `{"type": "join_session", "session_key": "...", "display_name": "..."}`
//! - `{"type": "update_canvas", "session_key": "...", "elements": [...], "background_color": "#121212"}`
//! - `{"type": "send_message", "session_key": "...", "message": "...", "display_name": "..."}`
//! - `{"type": "cursor_move", "session_key": "...", "x": 1.0, "y": 2.0, "display_name": "..."}`
//! - `{"type": "ping"}` / `{"type": "pong"}`
//!
//! ### Server -> Client
//!
//! - `{"type": "welcome", "connection_id": "...", "version": "..."}`
//! - `{"type": "update_canvas", "session_key": "...", "elements": [...], "background_color": "..."}`
//! - `{"type": "message", "session_key": "...", "message": "...", "display_name": "...", "sender_id": "..."}`
//! - `{"type": "user_cursor", "sender_id": "...", "display_name": "...", "x": 1.0, "y": 2.0}`
//! - `{"type": "participant_left", "sender_id": "..."}`
//! - `{"type": "ping"}` / `{"type": "pong"}`
//! - `{"type": "error", "code": "...", "message": "..."}`
//!
//! `sender_id` fields sent by clients are accepted for compatibility and
//! ignored; the server stamps relayed events with the connection's own id.

use board_core::{CanvasElement, ConnectionId, CursorState};
use serde::{Deserialize, Serialize};

/// Client-to-server message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach this connection to a session, creating it if needed.
    JoinSession {
        /// Opaque session key.
        session_key: String,
        /// Free-text name; defaults to a placeholder.
        #[serde(default)]
        display_name: Option<String>,
    },
    /// Replace the session's canvas with the sender's full state.
    UpdateCanvas {
        /// Target session.
        session_key: String,
        /// Complete element sequence.
        #[serde(default)]
        elements: Vec<CanvasElement>,
        /// Canvas background color.
        background_color: String,
    },
    /// Relay a chat line.
    SendMessage {
        /// Target session.
        session_key: String,
        /// Chat text.
        message: String,
        /// Name to show with the message.
        #[serde(default)]
        display_name: Option<String>,
        /// Ignored; the server uses the connection id.
        #[serde(default)]
        sender_id: Option<String>,
    },
    /// Relay a pointer position.
    CursorMove {
        /// Target session.
        session_key: String,
        /// Pointer X.
        x: f64,
        /// Pointer Y.
        y: f64,
        /// Name to label the cursor with.
        #[serde(default)]
        display_name: Option<String>,
        /// Ignored; the server uses the connection id.
        #[serde(default)]
        sender_id: Option<String>,
    },
    /// Client-initiated keep-alive.
    Ping,
    /// Reply to a server keep-alive.
    Pong,
}

impl ClientMessage {
    /// Short name for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinSession { .. } => "join_session",
            Self::UpdateCanvas { .. } => "update_canvas",
            Self::SendMessage { .. } => "send_message",
            Self::CursorMove { .. } => "cursor_move",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Session key the message targets, if any.
    #[must_use]
    pub fn session_key(&self) -> Option<&str> {
        match self {
            Self::JoinSession { session_key, .. }
            | Self::UpdateCanvas { session_key, .. }
            | Self::SendMessage { session_key, .. }
            | Self::CursorMove { session_key, .. } => Some(session_key),
            Self::Ping | Self::Pong => None,
        }
    }
}

/// Server-to-client message types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every connection.
    Welcome {
        /// This connection's id; appears as `sender_id` in relayed events.
        connection_id: ConnectionId,
        /// Server version.
        version: String,
    },
    /// Full canvas state, either the join snapshot or a relayed mutation.
    UpdateCanvas {
        /// Session the state belongs to.
        session_key: String,
        /// Complete element sequence.
        elements: Vec<CanvasElement>,
        /// Canvas background color.
        background_color: String,
    },
    /// Relayed chat line.
    Message {
        /// Session the message was sent in.
        session_key: String,
        /// Chat text.
        message: String,
        /// Sender's display name.
        display_name: String,
        /// Sender's connection id.
        sender_id: ConnectionId,
    },
    /// Relayed pointer position.
    UserCursor {
        /// Whose cursor moved.
        sender_id: ConnectionId,
        /// Cursor label.
        display_name: String,
        /// Pointer X.
        x: f64,
        /// Pointer Y.
        y: f64,
    },
    /// A participant detached; drop their cursor.
    ParticipantLeft {
        /// Connection id of the departed participant.
        sender_id: ConnectionId,
    },
    /// Server keep-alive.
    Ping,
    /// Reply to a client keep-alive.
    Pong,
    /// Error response.
    Error {
        /// Error code.
        code: String,
        /// Human-readable error message.
        message: String,
    },
}

impl ServerMessage {
    /// Build an error frame.
    #[must_use]
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Short name for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::UpdateCanvas { .. } => "update_canvas",
            Self::Message { .. } => "message",
            Self::UserCursor { .. } => "user_cursor",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

impl From<CursorState> for ServerMessage {
    fn from(cursor: CursorState) -> Self {
        Self::UserCursor {
            sender_id: cursor.connection_id,
            display_name: cursor.display_name,
            x: cursor.x,
            y: cursor.y,
        }
    }
}
