//! Session endpoints and the Google OAuth round trip.

use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use tracing::{info, warn};

use super::AppState;
use super::extract::CurrentUser;
use crate::auth::AuthError;
use crate::auth::session::{OAUTH_STATE_COOKIE, SESSION_COOKIE, generate_oauth_state};
use crate::error::ApiResult;
use crate::types::User;

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

fn cookie(state: &AppState, name: &'static str, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.auth.cookie_secure)
        .max_age(max_age)
        .build()
}

fn expired(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

pub async fn current_user(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// Redirect the browser to Google with a fresh CSRF state.
pub async fn google_login(State(state): State<AppState>, jar: CookieJar) -> ApiResult<(CookieJar, Redirect)> {
    let provider = state.identity.as_ref().ok_or(AuthError::NotConfigured)?;
    let csrf = generate_oauth_state();
    let url = provider.authorize_url(&csrf);
    let jar = jar.add(cookie(
        &state,
        OAUTH_STATE_COOKIE,
        csrf,
        time::Duration::minutes(OAUTH_STATE_TTL_MINUTES),
    ));
    Ok((jar, Redirect::to(&url)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

async fn complete_login(state: &AppState, jar: &CookieJar, query: CallbackQuery) -> Result<User, AuthError> {
    if let Some(error) = query.error {
        return Err(AuthError::Provider(error));
    }
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    if expected.is_none() || expected != query.state {
        return Err(AuthError::StateMismatch);
    }
    let code = query
        .code
        .ok_or_else(|| AuthError::Provider("callback without code".to_string()))?;

    let provider = state.identity.as_ref().ok_or(AuthError::NotConfigured)?;
    let profile = provider.exchange(&code).await?;
    let upsert = profile.into_user()?;
    state
        .db
        .upsert_user(&upsert)
        .map_err(|e| AuthError::Storage(e.to_string()))
}

/// Finish the OAuth flow: verify state, exchange the code, upsert the user,
/// and set the session cookie. Failures land on `/?error=auth_failed`.
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> (CookieJar, Redirect) {
    let result = complete_login(&state, &jar, query).await;
    let jar = jar.remove(expired(OAUTH_STATE_COOKIE));

    let user = match result {
        Ok(user) => user,
        Err(e) => {
            warn!("Login failed: {}", e);
            return (jar, Redirect::to("/?error=auth_failed"));
        }
    };

    match state.issue_token(&user) {
        Ok(token) => {
            info!(user_id = %user.id, "User logged in");
            let max_age = time::Duration::hours(state.config.auth.session_ttl_hours);
            let jar = jar.add(cookie(&state, SESSION_COOKIE, token, max_age));
            (jar, Redirect::to("/"))
        }
        Err(e) => {
            warn!(user_id = %user.id, "Failed to issue session: {}", e);
            (jar, Redirect::to("/?error=auth_failed"))
        }
    }
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    (jar.remove(expired(SESSION_COOKIE)), Redirect::to("/"))
}
