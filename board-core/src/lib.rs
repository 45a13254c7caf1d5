//! # Sketchboard Core
//!
//! Data model for the collaborative drawing surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 board-core                  │
//! ├─────────────────────────────────────────────┤
//! │  Element Model   │  Session Registry        │
//! │  - Strokes       │  - Sessions by key       │
//! │  - Shapes, text  │  - Presence rosters      │
//! │  - Auto-correct  │  - Teardown on empty     │
//! ├─────────────────────────────────────────────┤
//! │  Collaborator contracts                     │
//! │  - BoardStore (save/load finished boards)   │
//! │  - IdentityProvider (bearer -> principal)   │
//! │  - AccountStore (signup/login)              │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod account;
pub mod board;
pub mod element;
pub mod error;
pub mod identity;
pub mod presence;
pub mod registry;
pub mod session;
pub mod shape;

use std::time::{SystemTime, UNIX_EPOCH};

pub use account::{Account, AccountStore, FileAccountStore, MemoryAccountStore, DEFAULT_HASH_COST};
pub use board::{
    Board, BoardDraft, BoardId, BoardStore, BoardSummary, FileBoardStore, MemoryBoardStore,
};
pub use element::{CanvasElement, ElementKind, Extent, Point, Shape, Stroke, TextBlock};
pub use error::{CanvasError, CanvasResult};
pub use identity::{
    Identity, IdentityProvider, JwtProvider, StaticTokenProvider, TokenEntry, TOKEN_LIFETIME_SECS,
};
pub use presence::{
    normalize_display_name, ConnectionId, CursorState, Participant, Presence,
    DEFAULT_DISPLAY_NAME, MAX_DISPLAY_NAME_CHARS,
};
pub use registry::SessionRegistry;
pub use session::{CanvasSnapshot, Session, DEFAULT_BACKGROUND};
pub use shape::{detect_shape, CorrectedKind, DetectedShape};

/// Board core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the current Unix timestamp in milliseconds.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
