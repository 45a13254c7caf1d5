//! Error types for board operations.

use thiserror::Error;

/// Result type for board operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur in the collaborator layers (board storage, identity,
/// accounts).
///
/// The synchronization path itself has no error class: routing misses and
/// malformed elements are tolerated, not reported.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// No board with this id belongs to the requesting owner.
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    /// Board payload rejected before storage.
    #[error("Invalid board: {0}")]
    InvalidBoard(String),

    /// Bearer credential is unknown.
    #[error("Invalid credential")]
    InvalidCredential,

    /// Bearer credential was valid but has expired.
    #[error("Credential expired")]
    ExpiredCredential,

    /// An account with this username or email already exists.
    #[error("Account already exists")]
    AccountExists,

    /// Signup payload rejected before storage.
    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    /// Password hashing failed.
    #[error("Password hash error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    /// Signing a bearer token failed.
    #[error("Token error: {0}")]
    Token(#[source] jsonwebtoken::errors::Error),

    /// Board, account or token file serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error in a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
