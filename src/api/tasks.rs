//! Task endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::str::FromStr;
use tracing::info;

use super::AppState;
use super::extract::{ApiJson, CurrentUser, parse_task_id};
use crate::error::{ApiError, ApiResult, FieldError};
use crate::realtime::TaskEvent;
use crate::types::{
    ActivityWithUser, NewTask, Task, TaskFilters, TaskPage, TaskUpdate, TaskWithDetails,
};

const MAX_TITLE_LEN: usize = 255;

/// Distinguish an absent field (`None`) from an explicit null (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (local midnight).
pub(crate) fn parse_due_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Local
        .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional wire enum, collecting a field error on failure.
fn parse_field<T: FromStr>(
    field: &str,
    raw: Option<&str>,
    allowed: &str,
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    let raw = raw.map(str::trim)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(FieldError::new(field, format!("{field} must be one of {allowed}")));
            None
        }
    }
}

/// Like `parse_field`, but empty and `all` mean "no filter".
fn parse_filter<T: FromStr>(
    field: &str,
    raw: Option<&str>,
    allowed: &str,
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty() && *s != "all");
    parse_field(field, raw, allowed, errors)
}

fn validate_title(raw: &str, errors: &mut Vec<FieldError>) -> String {
    let title = raw.trim();
    if title.is_empty() {
        errors.push(FieldError::new("title", "Title is required"));
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.push(FieldError::new(
            "title",
            format!("Title must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    title.to_string()
}

fn normalize_description(raw: Option<String>) -> Option<String> {
    raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

const STATUS_VALUES: &str = "pending, in-progress, completed";
const PRIORITY_VALUES: &str = "low, medium, high";

/// Body of `POST /api/tasks`. Any `ownerId` sent by the client is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
}

impl CreateTaskRequest {
    pub fn validate(self) -> ApiResult<NewTask> {
        let mut errors = Vec::new();

        let title = validate_title(self.title.as_deref().unwrap_or_default(), &mut errors);
        let status = parse_field("status", self.status.as_deref(), STATUS_VALUES, &mut errors);
        let priority =
            parse_field("priority", self.priority.as_deref(), PRIORITY_VALUES, &mut errors);
        let due_date = match self.due_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let parsed = parse_due_date(raw);
                if parsed.is_none() {
                    errors.push(FieldError::new("dueDate", "dueDate must be an ISO 8601 date"));
                }
                parsed
            }
        };

        if !errors.is_empty() {
            return Err(ApiError::validation("Invalid task data", errors));
        }

        let mut task = NewTask::new(title);
        task.description = normalize_description(self.description);
        task.due_date = due_date;
        if let Some(status) = status {
            task.status = status;
        }
        if let Some(priority) = priority {
            task.priority = priority;
        }
        Ok(task)
    }
}

/// Body of `PATCH /api/tasks/{id}`. `null` clears description or dueDate.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<String>>,
}

impl UpdateTaskRequest {
    pub fn validate(self) -> ApiResult<TaskUpdate> {
        let mut errors = Vec::new();

        let title = self.title.as_deref().map(|t| validate_title(t, &mut errors));
        let status = parse_field("status", self.status.as_deref(), STATUS_VALUES, &mut errors);
        let priority =
            parse_field("priority", self.priority.as_deref(), PRIORITY_VALUES, &mut errors);
        let due_date = match self.due_date {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) if raw.trim().is_empty() => Some(None),
            Some(Some(raw)) => match parse_due_date(&raw) {
                Some(dt) => Some(Some(dt)),
                None => {
                    errors.push(FieldError::new("dueDate", "dueDate must be an ISO 8601 date"));
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(ApiError::validation("Invalid task update", errors));
        }

        Ok(TaskUpdate {
            title,
            description: self.description.map(normalize_description),
            status,
            priority,
            due_date,
        })
    }
}

/// Query string of `GET /api/tasks`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date_filter: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

fn parse_positive(field: &str, raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<u32> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            errors.push(FieldError::new(field, format!("{field} must be a positive integer")));
            None
        }
    }
}

impl ListTasksQuery {
    pub fn into_filters(self, state: &AppState) -> ApiResult<TaskFilters> {
        let mut errors = Vec::new();

        let filters = TaskFilters {
            status: parse_filter("status", self.status.as_deref(), STATUS_VALUES, &mut errors),
            priority: parse_filter("priority", self.priority.as_deref(), PRIORITY_VALUES, &mut errors),
            due_date_filter: parse_filter(
                "dueDateFilter",
                self.due_date_filter.as_deref(),
                "today, overdue, upcoming",
                &mut errors,
            ),
            search: self.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            sort_by: parse_filter(
                "sortBy",
                self.sort_by.as_deref(),
                "dueDate, priority, created, title",
                &mut errors,
            )
            .unwrap_or_default(),
            sort_order: parse_filter("sortOrder", self.sort_order.as_deref(), "asc, desc", &mut errors)
                .unwrap_or_default(),
            page: parse_positive("page", self.page.as_deref(), &mut errors).unwrap_or(1),
            limit: state
                .config
                .page_size(parse_positive("limit", self.limit.as_deref(), &mut errors)),
        };

        if !errors.is_empty() {
            return Err(ApiError::validation("Invalid query parameters", errors));
        }
        Ok(filters)
    }
}

pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<TaskPage>> {
    let filters = query.into_filters(&state)?;
    let page = state.db.list_tasks(&user.id, &filters)?;
    Ok(Json(page))
}

pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskWithDetails>> {
    let task_id = parse_task_id(&id)?;
    let task = state
        .db
        .get_task(task_id, &user.id)?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    Ok(Json(task))
}

pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let new_task = body.validate()?;
    let task = state.db.create_task(&user.id, &new_task)?;
    info!(task_id = task.id, user_id = %user.id, "Task created");

    state.record_activity(task.id, &user.id, "created", json!({ "title": task.title }));
    let audience = state.audience(task.id);
    state.notify(&audience, TaskEvent::Created { task: task.clone() }, &user);

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let task_id = parse_task_id(&id)?;
    let update = body.validate()?;
    let task = state
        .db
        .update_task(task_id, &user.id, &update)?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    info!(task_id, user_id = %user.id, "Task updated");

    let changes = update.changes();
    state.record_activity(
        task_id,
        &user.id,
        "updated",
        serde_json::Value::Object(changes.clone()),
    );
    let audience = state.audience(task_id);
    state.notify(
        &audience,
        TaskEvent::Updated {
            task: task.clone(),
            changes,
        },
        &user,
    );

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let task_id = parse_task_id(&id)?;
    // Shares cascade with the task, so capture the audience first
    let audience = state.audience(task_id);
    if !state.db.delete_task(task_id, &user.id)? {
        return Err(ApiError::task_not_found(task_id));
    }
    info!(task_id, user_id = %user.id, "Task deleted");

    state.notify(&audience, TaskEvent::Deleted { task_id }, &user);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_activities(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ActivityWithUser>>> {
    let task_id = parse_task_id(&id)?;
    if state.db.get_task(task_id, &user.id)?.is_none() {
        return Err(ApiError::task_not_found(task_id));
    }
    Ok(Json(state.db.get_activities(task_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskPriority, TaskStatus};

    #[test]
    fn create_defaults_status_and_priority() {
        let req: CreateTaskRequest =
            serde_json::from_value(json!({"title": "  Write report  ", "ownerId": "mallory"}))
                .unwrap();
        let task = req.validate().unwrap();
        assert_eq!(task.title, "Write report");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.due_date.is_none());
    }

    #[test]
    fn create_collects_every_field_error() {
        let req: CreateTaskRequest = serde_json::from_value(json!({
            "title": "",
            "status": "done",
            "priority": "urgent",
            "dueDate": "next week"
        }))
        .unwrap();
        let err = req.validate().unwrap_err();
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "status", "priority", "dueDate"]);
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let req: UpdateTaskRequest =
            serde_json::from_value(json!({"dueDate": null, "status": "completed"})).unwrap();
        let update = req.validate().unwrap();
        assert_eq!(update.due_date, Some(None));
        assert_eq!(update.description, None);
        assert_eq!(update.status, Some(TaskStatus::Completed));
    }

    #[test]
    fn update_rejects_unknown_status() {
        let req: UpdateTaskRequest = serde_json::from_value(json!({"status": "done"})).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn due_dates_accept_rfc3339_and_plain_dates() {
        let dt = parse_due_date("2024-03-01T12:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T12:00:00+00:00");
        assert!(parse_due_date("2024-03-01").is_some());
        assert!(parse_due_date("03/01/2024").is_none());
    }
}
