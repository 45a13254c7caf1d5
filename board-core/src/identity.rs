//! Identity collaborator contract.
//!
//! Turns an opaque bearer credential into a principal id and a display name.
//! The sync engine does not use it: display names arrive there as unchecked
//! free text. Only the board API authenticates.
//!
//! Two providers ship: [`JwtProvider`] verifies the HS256 tokens issued at
//! signup and login, and [`StaticTokenProvider`] serves a fixed token table.

use std::collections::HashMap;
use std::path::Path;

use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::current_timestamp_ms;
use crate::error::{CanvasError, CanvasResult};

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque, stable principal id; owns saved boards.
    pub principal_id: String,
    /// Human-readable name.
    pub display_name: String,
}

/// Resolves bearer credentials to identities.
pub trait IdentityProvider: Send + Sync {
    /// Authenticate a bearer credential.
    ///
    /// # Errors
    ///
    /// [`CanvasError::InvalidCredential`] for unknown tokens,
    /// [`CanvasError::ExpiredCredential`] for expired ones.
    fn authenticate(&self, token: &str) -> CanvasResult<Identity>;
}

/// One issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    /// The bearer secret.
    pub token: String,
    /// Principal the token authenticates as.
    pub principal_id: String,
    /// Display name of the principal.
    pub display_name: String,
    /// Expiry (Unix milliseconds); never expires when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenFile {
    tokens: Vec<TokenEntry>,
}

/// Fixed token table, typically loaded from a JSON file at startup.
///
/// File format: `{"tokens": [{"token": "...", "principal_id": "...",
/// "display_name": "...", "expires_at": 1700000000000}]}`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, TokenEntry>,
}

impl StaticTokenProvider {
    /// Create a provider with no tokens; every credential is rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider from token entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = TokenEntry>) -> Self {
        Self {
            tokens: entries
                .into_iter()
                .map(|entry| (entry.token.clone(), entry))
                .collect(),
        }
    }

    /// Load tokens from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Io`] or [`CanvasError::Serialization`] if the
    /// file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> CanvasResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let file: TokenFile = serde_json::from_str(&contents)?;
        Ok(Self::from_entries(file.tokens))
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn authenticate(&self, token: &str) -> CanvasResult<Identity> {
        let entry = self
            .tokens
            .get(token)
            .ok_or(CanvasError::InvalidCredential)?;
        if entry
            .expires_at
            .is_some_and(|expires_at| expires_at <= current_timestamp_ms())
        {
            return Err(CanvasError::ExpiredCredential);
        }
        Ok(Identity {
            principal_id: entry.principal_id.clone(),
            display_name: entry.display_name.clone(),
        })
    }
}

/// Lifetime of an issued token: seven days.
pub const TOKEN_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Claims carried by an issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claims {
    user_id: String,
    username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    exp: u64,
}

/// Issues and verifies HS256 bearer tokens signed with a shared secret.
///
/// Tokens carry `userId`, `username`, `email` and `exp` (Unix seconds).
#[derive(Clone)]
pub struct JwtProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime_secs: u64,
}

impl std::fmt::Debug for JwtProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtProvider")
            .field("lifetime_secs", &self.lifetime_secs)
            .finish_non_exhaustive()
    }
}

impl JwtProvider {
    /// Create a provider signing with `secret`.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime_secs: TOKEN_LIFETIME_SECS,
        }
    }

    /// Override the token lifetime.
    #[must_use]
    pub fn with_lifetime(mut self, secs: u64) -> Self {
        self.lifetime_secs = secs;
        self
    }

    /// Sign a token for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Token`] if signing fails.
    pub fn issue(&self, identity: &Identity, email: Option<&str>) -> CanvasResult<String> {
        let claims = Claims {
            user_id: identity.principal_id.clone(),
            username: identity.display_name.clone(),
            email: email.map(str::to_string),
            exp: current_timestamp_ms() / 1000 + self.lifetime_secs,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(CanvasError::Token)
    }
}

impl IdentityProvider for JwtProvider {
    fn authenticate(&self, token: &str) -> CanvasResult<Identity> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CanvasError::ExpiredCredential,
                _ => CanvasError::InvalidCredential,
            })?;
        Ok(Identity {
            principal_id: data.claims.user_id,
            display_name: data.claims.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: &str, expires_at: Option<u64>) -> TokenEntry {
        TokenEntry {
            token: token.to_string(),
            principal_id: format!("user-{token}"),
            display_name: "Alice".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_known_token_authenticates() {
        let provider = StaticTokenProvider::from_entries([entry("t1", None)]);
        let identity = provider.authenticate("t1").expect("valid");
        assert_eq!(identity.principal_id, "user-t1");
        assert_eq!(identity.display_name, "Alice");
    }

    #[test]
    fn test_unknown_token_is_invalid() {
        let provider = StaticTokenProvider::new();
        assert!(matches!(
            provider.authenticate("nope"),
            Err(CanvasError::InvalidCredential)
        ));
    }

    #[test]
    fn test_expired_token() {
        let provider = StaticTokenProvider::from_entries([entry("old", Some(1))]);
        assert!(matches!(
            provider.authenticate("old"),
            Err(CanvasError::ExpiredCredential)
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokens.json");
        std::fs::write(
            &path,
            r#"{"tokens":[{"token":"abc","principal_id":"p1","display_name":"Pat"}]}"#,
        )
        .expect("write");

        let provider = StaticTokenProvider::from_file(&path).expect("load");
        assert_eq!(provider.len(), 1);
        assert_eq!(provider.authenticate("abc").expect("valid").principal_id, "p1");
    }

    // -----------------------------------------------------------------------
    // JWT provider tests
    // -----------------------------------------------------------------------

    fn pat() -> Identity {
        Identity {
            principal_id: "p-42".to_string(),
            display_name: "pat".to_string(),
        }
    }

    #[test]
    fn test_issued_token_authenticates() {
        let provider = JwtProvider::new(b"secret");
        let token = provider.issue(&pat(), Some("pat@example.com")).expect("issue");
        assert_eq!(provider.authenticate(&token).expect("valid"), pat());
    }

    #[test]
    fn test_issued_token_lasts_seven_days() {
        let provider = JwtProvider::new(b"secret");
        let token = provider.issue(&pat(), None).expect("issue");
        let claims = jsonwebtoken::decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .expect("decode")
        .claims;

        let now = current_timestamp_ms() / 1000;
        assert!(claims.exp >= now + TOKEN_LIFETIME_SECS - 5);
        assert!(claims.exp <= now + TOKEN_LIFETIME_SECS);
        assert_eq!(claims.user_id, "p-42");
        assert!(claims.email.is_none());
    }

    #[test]
    fn test_expired_jwt_is_expired_credential() {
        let provider = JwtProvider::new(b"secret");
        let claims = Claims {
            user_id: "p-42".to_string(),
            username: "pat".to_string(),
            email: None,
            exp: current_timestamp_ms() / 1000 - 10,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .expect("encode");

        assert!(matches!(
            provider.authenticate(&token),
            Err(CanvasError::ExpiredCredential)
        ));
    }

    #[test]
    fn test_foreign_or_garbled_jwt_is_invalid() {
        let ours = JwtProvider::new(b"secret");
        let theirs = JwtProvider::new(b"other-secret");
        let token = theirs.issue(&pat(), None).expect("issue");

        assert!(matches!(
            ours.authenticate(&token),
            Err(CanvasError::InvalidCredential)
        ));
        assert!(matches!(
            ours.authenticate("not.a.jwt"),
            Err(CanvasError::InvalidCredential)
        ));
    }
}
