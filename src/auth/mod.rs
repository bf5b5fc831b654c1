//! Authentication: identity provider round trip and signed session tokens.

pub mod google;
pub mod session;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ApiError;
use crate::types::UpsertUser;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Identity profile has no email address")]
    MissingEmail,

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Identity provider is not configured")]
    NotConfigured,

    #[error("Failed to store user: {0}")]
    Storage(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken | AuthError::StateMismatch => ApiError::unauthenticated(),
            AuthError::MissingEmail => ApiError::invalid_field("email", &err.to_string()),
            AuthError::Provider(_) | AuthError::NotConfigured => ApiError::external(err),
            AuthError::TokenError(_) => ApiError::internal(err),
            AuthError::Storage(_) => ApiError::database(err),
        }
    }
}

/// Profile returned by an identity provider after a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub id: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub photo_url: Option<String>,
}

impl IdentityProfile {
    /// Map to a user upsert. A profile without an email cannot become a user.
    pub fn into_user(self) -> Result<UpsertUser, AuthError> {
        let email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::MissingEmail)?;
        Ok(UpsertUser {
            id: self.id,
            email,
            display_name: self.given_name,
            avatar_url: self.photo_url,
        })
    }
}

/// External identity provider (OAuth authorization-code flow).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is redirected to, carrying the CSRF `state`.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange the callback `code` for the user's profile.
    async fn exchange(&self, code: &str) -> Result<IdentityProfile, AuthError>;
}
