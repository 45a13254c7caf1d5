//! Input validation for untrusted data.
//!
//! Everything a client sends over the socket is checked here before it
//! reaches the engine. Canvas elements themselves are not validated; they
//! pass through as the client produced them.

use thiserror::Error;

/// Maximum length for session keys (bytes).
pub const MAX_SESSION_KEY_LEN: usize = 256;
/// Maximum length for a chat message (bytes).
pub const MAX_CHAT_MESSAGE_LEN: usize = 16_384;
/// Default maximum WebSocket message size.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Session key is empty.
    #[error("session_key must not be empty")]
    SessionKeyEmpty,
    /// Session key exceeds maximum length.
    #[error("session_key too long (max {MAX_SESSION_KEY_LEN} bytes)")]
    SessionKeyTooLong,
    /// Session key contains whitespace or control characters.
    #[error("session_key contains invalid characters")]
    SessionKeyInvalidChars,
    /// Chat message exceeds maximum length.
    #[error("message too long (max {MAX_CHAT_MESSAGE_LEN} bytes)")]
    ChatMessageTooLong,
    /// Cursor coordinates are not finite.
    #[error("cursor coordinates must be finite")]
    InvalidCoordinates,
    /// WebSocket message exceeds maximum size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    MessageTooLarge {
        /// Received size.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

impl ValidationError {
    /// Label for the validation-failure metric.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionKeyEmpty | Self::SessionKeyTooLong | Self::SessionKeyInvalidChars => {
                "session_key"
            }
            Self::ChatMessageTooLong => "chat_message",
            Self::InvalidCoordinates => "cursor",
            Self::MessageTooLarge { .. } => "message_size",
        }
    }
}

/// Validate a session key.
///
/// Keys are opaque and come from an external generator. Valid keys are
/// 1-256 bytes with no whitespace or control characters.
///
/// # Errors
///
/// Returns [`ValidationError::SessionKeyEmpty`], [`ValidationError::SessionKeyTooLong`]
/// or [`ValidationError::SessionKeyInvalidChars`].
pub fn validate_session_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::SessionKeyEmpty);
    }
    if key.len() > MAX_SESSION_KEY_LEN {
        return Err(ValidationError::SessionKeyTooLong);
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::SessionKeyInvalidChars);
    }
    Ok(())
}

/// Validate chat message length.
///
/// # Errors
///
/// Returns [`ValidationError::ChatMessageTooLong`] past 16 KiB.
pub fn validate_chat_message(message: &str) -> Result<(), ValidationError> {
    if message.len() > MAX_CHAT_MESSAGE_LEN {
        return Err(ValidationError::ChatMessageTooLong);
    }
    Ok(())
}

/// Validate cursor coordinates.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCoordinates`] for NaN or infinite values.
pub fn validate_coordinates(x: f64, y: f64) -> Result<(), ValidationError> {
    if x.is_finite() && y.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::InvalidCoordinates)
    }
}

/// Validate WebSocket message size against the configured limit.
///
/// # Errors
///
/// Returns [`ValidationError::MessageTooLarge`] if `size` exceeds `max`.
pub fn validate_message_size(size: usize, max: usize) -> Result<(), ValidationError> {
    if size > max {
        return Err(ValidationError::MessageTooLarge { size, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_session_keys() {
        assert!(validate_session_key("abc123").is_ok());
        assert!(validate_session_key("9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c").is_ok());
        assert!(validate_session_key("room_1-a.b").is_ok());
        assert!(validate_session_key("a").is_ok());
    }

    #[test]
    fn test_invalid_session_keys() {
        assert_eq!(
            validate_session_key(""),
            Err(ValidationError::SessionKeyEmpty)
        );
        assert_eq!(
            validate_session_key("has spaces"),
            Err(ValidationError::SessionKeyInvalidChars)
        );
        assert_eq!(
            validate_session_key("line\nbreak"),
            Err(ValidationError::SessionKeyInvalidChars)
        );
        assert_eq!(
            validate_session_key(&"x".repeat(MAX_SESSION_KEY_LEN + 1)),
            Err(ValidationError::SessionKeyTooLong)
        );
    }

    #[test]
    fn test_session_key_boundary() {
        assert!(validate_session_key(&"x".repeat(MAX_SESSION_KEY_LEN)).is_ok());
    }

    #[test]
    fn test_chat_message_length() {
        assert!(validate_chat_message("").is_ok());
        assert!(validate_chat_message(&"x".repeat(MAX_CHAT_MESSAGE_LEN)).is_ok());
        assert!(validate_chat_message(&"x".repeat(MAX_CHAT_MESSAGE_LEN + 1)).is_err());
    }

    #[test]
    fn test_coordinates() {
        assert!(validate_coordinates(0.0, -12.5).is_ok());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(validate_coordinates(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_message_size() {
        assert!(validate_message_size(1000, DEFAULT_MAX_MESSAGE_BYTES).is_ok());
        assert!(validate_message_size(DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_MESSAGE_BYTES).is_ok());
        assert_eq!(
            validate_message_size(11, 10),
            Err(ValidationError::MessageTooLarge { size: 11, max: 10 })
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ValidationError::SessionKeyEmpty.kind(), "session_key");
        assert_eq!(
            ValidationError::MessageTooLarge { size: 2, max: 1 }.kind(),
            "message_size"
        );
    }

    proptest! {
        #[test]
        fn prop_printable_keys_are_accepted(key in "[A-Za-z0-9_.-]{1,256}") {
            prop_assert!(validate_session_key(&key).is_ok());
        }

        #[test]
        fn prop_keys_with_whitespace_are_rejected(
            prefix in "[a-z0-9]{0,20}",
            ws in "[ \t\r\n]",
            suffix in "[a-z0-9]{0,20}",
        ) {
            let key = format!("{prefix}{ws}{suffix}");
            prop_assert!(validate_session_key(&key).is_err());
        }
    }
}
