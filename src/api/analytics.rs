//! Analytics endpoints. Every figure covers only tasks the caller can see.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use super::AppState;
use super::extract::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::types::{ProductivityPoint, TaskStats, TeamMemberStats};

#[derive(Debug, Default, Deserialize)]
pub struct ProductivityQuery {
    pub days: Option<String>,
}

pub async fn stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<TaskStats>> {
    Ok(Json(state.db.get_stats(&user.id)?))
}

pub async fn productivity(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ProductivityQuery>,
) -> ApiResult<Json<Vec<ProductivityPoint>>> {
    let requested = match query.days.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| ApiError::invalid_field("days", "days must be a positive integer"))?,
        ),
    };
    let days = state.config.productivity_days(requested);
    Ok(Json(state.db.get_productivity(&user.id, days)?))
}

pub async fn team(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<TeamMemberStats>>> {
    Ok(Json(state.db.get_team_performance(&user.id)?))
}
