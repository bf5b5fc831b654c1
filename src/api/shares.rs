//! Sharing endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;
use tracing::info;

use super::AppState;
use super::extract::{ApiJson, CurrentUser, parse_task_id};
use crate::db::shares::ShareOutcome;
use crate::error::{ApiError, ApiResult, FieldError};
use crate::realtime::TaskEvent;
use crate::types::{ActivityDetails, SharePermission, ShareWithUser, TaskShare};

static EMAIL_RE: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern is valid")
});

/// Body of `POST /api/tasks/{id}/share`.
#[derive(Debug, Deserialize)]
pub struct ShareTaskRequest {
    pub email: Option<String>,
    pub permission: Option<String>,
}

impl ShareTaskRequest {
    pub fn validate(self) -> ApiResult<(String, SharePermission)> {
        let mut errors = Vec::new();

        let email = self.email.unwrap_or_default().trim().to_string();
        if !EMAIL_RE.is_match(&email) {
            errors.push(FieldError::new("email", "A valid email address is required"));
        }

        let permission = match self.permission.as_deref().map(str::trim) {
            Some(raw) => raw.parse::<SharePermission>().ok(),
            None => None,
        };
        if permission.is_none() {
            errors.push(FieldError::new("permission", "Permission must be 'view' or 'edit'"));
        }

        match permission {
            Some(permission) if errors.is_empty() => Ok((email, permission)),
            _ => Err(ApiError::validation("Invalid share request", errors)),
        }
    }
}

pub async fn share_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ShareTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskShare>)> {
    let task_id = parse_task_id(&id)?;
    let (email, permission) = body.validate()?;

    let outcome = state.db.share_task(task_id, &user.id, &email, permission)?;
    let status = match outcome {
        ShareOutcome::Created(_) => StatusCode::CREATED,
        ShareOutcome::Updated(_) | ShareOutcome::Unchanged(_) => StatusCode::OK,
    };

    if outcome.is_change() {
        let share = outcome.share();
        info!(task_id, owner = %user.id, recipient = %share.user_id, %permission, "Task shared");
        state.record_activity(
            task_id,
            &user.id,
            "shared",
            json!({ "sharedWith": email, "permission": permission }),
        );
        let audience = state.audience(task_id);
        state.notify(&audience, TaskEvent::Shared { share: share.clone() }, &user);
    }

    Ok((status, Json(outcome.into_share())))
}

pub async fn list_shares(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ShareWithUser>>> {
    let task_id = parse_task_id(&id)?;
    if state.db.get_task(task_id, &user.id)?.is_none() {
        return Err(ApiError::task_not_found(task_id));
    }
    Ok(Json(state.db.list_shares(task_id)?))
}

pub async fn remove_share(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, target_user_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let task_id = parse_task_id(&id)?;
    let permission = state
        .db
        .task_permission(task_id, &user.id)?
        .filter(|p| p.can_view())
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    if !permission.can_share() {
        return Err(ApiError::forbidden("Only the task owner can remove shares"));
    }

    // Collect the audience while the grantee still belongs to it
    let audience = state.audience(task_id);
    if !state.db.remove_share(task_id, &target_user_id)? {
        return Err(ApiError::share_not_found(task_id, &target_user_id));
    }
    info!(task_id, owner = %user.id, removed = %target_user_id, "Share removed");

    state.record_activity(task_id, &user.id, "unshared", json!({ "userId": target_user_id }));
    if let Some(task) = state.db.get_task(task_id, &user.id)? {
        let mut changes = ActivityDetails::new();
        changes.insert("unshared".to_string(), json!(target_user_id));
        state.notify(
            &audience,
            TaskEvent::Updated {
                task: task.task,
                changes,
            },
            &user,
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, permission: &str) -> ShareTaskRequest {
        ShareTaskRequest {
            email: Some(email.to_string()),
            permission: Some(permission.to_string()),
        }
    }

    #[test]
    fn accepts_valid_request() {
        let (email, permission) = request(" bob@example.com ", "edit").validate().unwrap();
        assert_eq!(email, "bob@example.com");
        assert_eq!(permission, SharePermission::Edit);
    }

    #[test]
    fn rejects_bad_email_and_permission_together() {
        let err = request("not-an-email", "admin").validate().unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(err.errors[1].message, "Permission must be 'view' or 'edit'");
    }
}
