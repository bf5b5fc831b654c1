//! Request extractors: the authenticated caller and JSON bodies with
//! structured rejections.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{header, request::Parts},
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, de::DeserializeOwned};

use super::AppState;
use crate::auth::session::{SESSION_COOKIE, verify_session_token};
use crate::error::ApiError;
use crate::types::{TaskId, User};

/// The authenticated caller, loaded fresh from the database.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Session token from the cookie, a bearer header, or `?token=` (WebSocket
/// clients cannot set headers), in that order.
fn session_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    if let Some(bearer) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim().to_string());
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or_else(ApiError::unauthenticated)?;
        let claims = verify_session_token(&token, state.session_secret.as_bytes())?;
        // Deleted users keep valid signatures; the row decides
        let user = state
            .db
            .get_user(&claims.sub)?
            .ok_or_else(ApiError::unauthenticated)?;
        Ok(CurrentUser(user))
    }
}

/// `Json<T>` whose rejection is a 400 `ApiError` instead of axum's plain text.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::validation(rejection.body_text(), Vec::new())),
        }
    }
}

/// Parse a `{id}` path segment.
pub fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse::<TaskId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::invalid_field("id", "Task id must be a positive integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(req: HttpRequest<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn token_from_cookie_wins() {
        let p = parts(
            HttpRequest::builder()
                .uri("/ws?token=q")
                .header(header::COOKIE, format!("{SESSION_COOKIE}=c"))
                .header(header::AUTHORIZATION, "Bearer b")
                .body(())
                .unwrap(),
        );
        assert_eq!(session_token(&p).as_deref(), Some("c"));
    }

    #[test]
    fn token_from_bearer_then_query() {
        let p = parts(
            HttpRequest::builder()
                .uri("/ws?token=q")
                .header(header::AUTHORIZATION, "Bearer b")
                .body(())
                .unwrap(),
        );
        assert_eq!(session_token(&p).as_deref(), Some("b"));

        let p = parts(HttpRequest::builder().uri("/ws?token=q").body(()).unwrap());
        assert_eq!(session_token(&p).as_deref(), Some("q"));

        let p = parts(HttpRequest::builder().uri("/ws").body(()).unwrap());
        assert!(session_token(&p).is_none());
    }

    #[test]
    fn task_ids_must_be_positive_integers() {
        assert_eq!(parse_task_id("42").unwrap(), 42);
        assert!(parse_task_id("0").is_err());
        assert!(parse_task_id("abc").is_err());
    }
}
