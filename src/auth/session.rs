//! Session token generation and verification.

use std::path::Path;

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::AuthError;
use crate::types::User;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "taskhub_session";

/// Cookie carrying the OAuth CSRF state between redirect and callback.
pub const OAUTH_STATE_COOKIE: &str = "taskhub_oauth_state";

/// Claims inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// Sign an HS256 session token for the user.
pub fn issue_session_token(user: &User, secret: &[u8], ttl_hours: i64) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = SessionClaims {
        sub: user.id.clone(),
        email: user.email.clone(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
        iat: now.timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
}

/// Verify a session token, returning its claims.
pub fn verify_session_token(token: &str, secret: &[u8]) -> Result<SessionClaims, AuthError> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<SessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
}

/// Resolve the signing secret: configured value, else a secret persisted at
/// `fallback`, else a freshly generated one written there.
pub fn resolve_session_secret(configured: Option<&str>, fallback: &Path) -> anyhow::Result<String> {
    if let Some(secret) = configured.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(secret.to_string());
    }
    if let Ok(existing) = std::fs::read_to_string(fallback) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    if let Some(parent) = fallback.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(fallback, &secret)?;
    info!(path = %fallback.display(), "Generated new session secret");
    Ok(secret)
}

/// Random CSRF state for the OAuth redirect.
pub fn generate_oauth_state() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: "u-1".into(),
            email: "ana@example.com".into(),
            display_name: "Ana".into(),
            avatar_url: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn token_round_trip() {
        let token = issue_session_token(&user(), b"secret", 1).unwrap();
        let claims = verify_session_token(&token, b"secret").unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.email, "ana@example.com");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_session_token(&user(), b"secret", 1).unwrap();
        assert!(matches!(
            verify_session_token(&token, b"other"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Well past the default leeway
        let token = issue_session_token(&user(), b"secret", -2).unwrap();
        assert!(verify_session_token(&token, b"secret").is_err());
    }

    #[test]
    fn secret_is_persisted_once_generated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session-secret");

        let first = resolve_session_secret(None, &path).unwrap();
        let second = resolve_session_secret(Some("  "), &path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let configured = resolve_session_secret(Some("configured"), &path).unwrap();
        assert_eq!(configured, "configured");
    }
}
