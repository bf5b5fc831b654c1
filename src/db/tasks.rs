//! Task CRUD, listing and audience lookup.

use super::{
    DAY_MS, Database, LOWER_FN, SHARE_COLUMNS, TASK_COLUMNS, USER_COLUMNS, VISIBLE_TO_USER, now_ms,
    share_from_row, start_of_today_ms, task_from_row, user_from_row,
};
use crate::permissions::{Permission, resolve_permission};
use crate::types::{
    DueDateFilter, NewTask, ShareWithUser, SortBy, SortOrder, Task, TaskFilters, TaskId,
    TaskPage, TaskShare, TaskStatus, TaskUpdate, TaskWithDetails, User,
};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use tracing::warn;

/// Build an ORDER BY clause. Undated tasks always sort last; id breaks ties
/// so pagination is stable.
fn build_order_clause(sort_by: SortBy, sort_order: SortOrder) -> String {
    let dir = sort_order.as_sql();
    let field = match sort_by {
        SortBy::DueDate => format!("t.due_date IS NULL, t.due_date {dir}"),
        SortBy::Priority => format!(
            "CASE t.priority WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END {dir}"
        ),
        SortBy::Created => format!("t.created_at {dir}"),
        SortBy::Title => format!("t.title COLLATE NOCASE {dir}"),
    };
    format!(" ORDER BY {field}, t.id {dir}")
}

/// Search needle compared against lowercased title and description.
fn search_needle(search: &str) -> String {
    search.to_lowercase()
}

pub(crate) fn load_task(conn: &Connection, task_id: TaskId) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1"),
            params![task_id],
            |row| task_from_row(row, 0),
        )
        .optional()?;
    Ok(task)
}

pub(crate) fn load_task_shares(conn: &Connection, task_id: TaskId) -> Result<Vec<TaskShare>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SHARE_COLUMNS} FROM task_shares s WHERE s.task_id = ?1 ORDER BY s.created_at, s.id"
    ))?;
    let shares = stmt
        .query_map(params![task_id], |row| share_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(shares)
}

/// Load a task with its shares and resolve the user's access in one pass.
pub(crate) fn load_with_permission(
    conn: &Connection,
    task_id: TaskId,
    user_id: &str,
) -> Result<Option<(Task, Permission)>> {
    let Some(task) = load_task(conn, task_id)? else {
        return Ok(None);
    };
    let shares = load_task_shares(conn, task_id)?;
    let permission = resolve_permission(&task, &shares, user_id);
    Ok(Some((task, permission)))
}

/// Join owners and shares onto a batch of tasks, preserving order.
fn attach_details(conn: &Connection, tasks: Vec<Task>) -> Result<Vec<TaskWithDetails>> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let owner_ids: Vec<&str> = tasks.iter().map(|t| t.owner_id.as_str()).collect();
    let task_ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users u WHERE u.id IN (SELECT value FROM json_each(?1))"
    ))?;
    let owners: HashMap<String, User> = stmt
        .query_map(params![serde_json::to_string(&owner_ids)?], |row| {
            user_from_row(row, 0)
        })?
        .map(|r| r.map(|u| (u.id.clone(), u)))
        .collect::<rusqlite::Result<_>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {SHARE_COLUMNS}, {USER_COLUMNS}
         FROM task_shares s
         JOIN users u ON u.id = s.user_id
         WHERE s.task_id IN (SELECT value FROM json_each(?1))
         ORDER BY s.created_at, s.id"
    ))?;
    let mut shares: HashMap<TaskId, Vec<ShareWithUser>> = HashMap::new();
    let rows = stmt.query_map(params![serde_json::to_string(&task_ids)?], |row| {
        Ok(ShareWithUser {
            share: share_from_row(row, 0)?,
            user: user_from_row(row, 5)?,
        })
    })?;
    for row in rows {
        let share = row?;
        shares.entry(share.share.task_id).or_default().push(share);
    }

    let mut detailed = Vec::with_capacity(tasks.len());
    for task in tasks {
        let Some(owner) = owners.get(&task.owner_id).cloned() else {
            warn!(task_id = task.id, owner_id = %task.owner_id, "Task owner missing, skipping");
            continue;
        };
        let shares = shares.remove(&task.id).unwrap_or_default();
        detailed.push(TaskWithDetails {
            task,
            owner,
            shares,
        });
    }
    Ok(detailed)
}

/// `completed_at` is stamped on entering completed, kept while completed,
/// and cleared on leaving it.
fn completion_timestamp(
    previous: TaskStatus,
    previous_completed_at: Option<i64>,
    next: TaskStatus,
    now: i64,
) -> Option<i64> {
    match (previous, next) {
        (TaskStatus::Completed, TaskStatus::Completed) => previous_completed_at.or(Some(now)),
        (_, TaskStatus::Completed) => Some(now),
        _ => None,
    }
}

impl Database {
    /// List tasks visible to a user, relative to the current local day.
    pub fn list_tasks(&self, user_id: &str, filters: &TaskFilters) -> Result<TaskPage> {
        self.list_tasks_at(user_id, filters, start_of_today_ms())
    }

    /// List tasks visible to a user with due-date windows anchored at `today_start`.
    pub fn list_tasks_at(
        &self,
        user_id: &str,
        filters: &TaskFilters,
        today_start: i64,
    ) -> Result<TaskPage> {
        self.with_conn(|conn| {
            let mut conditions = format!(" WHERE {VISIBLE_TO_USER}");
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];
            let mut param_idx = 2;

            if let Some(status) = filters.status {
                conditions.push_str(&format!(" AND t.status = ?{}", param_idx));
                params_vec.push(Box::new(status));
                param_idx += 1;
            }

            if let Some(priority) = filters.priority {
                conditions.push_str(&format!(" AND t.priority = ?{}", param_idx));
                params_vec.push(Box::new(priority));
                param_idx += 1;
            }

            if let Some(window) = filters.due_date_filter {
                match window {
                    DueDateFilter::Today => {
                        conditions.push_str(&format!(
                            " AND t.due_date >= ?{} AND t.due_date < ?{}",
                            param_idx,
                            param_idx + 1
                        ));
                        params_vec.push(Box::new(today_start));
                        params_vec.push(Box::new(today_start + DAY_MS));
                        param_idx += 2;
                    }
                    DueDateFilter::Overdue => {
                        conditions.push_str(&format!(
                            " AND t.due_date < ?{} AND t.status = 'pending'",
                            param_idx
                        ));
                        params_vec.push(Box::new(today_start));
                        param_idx += 1;
                    }
                    DueDateFilter::Upcoming => {
                        conditions.push_str(&format!(" AND t.due_date >= ?{}", param_idx));
                        params_vec.push(Box::new(today_start + DAY_MS));
                        param_idx += 1;
                    }
                }
            }

            if let Some(search) = filters.search.as_deref().map(str::trim) {
                if !search.is_empty() {
                    // instr matches literally, so % and _ need no escaping
                    conditions.push_str(&format!(
                        " AND (instr({LOWER_FN}(t.title), ?{0}) > 0 \
                         OR instr({LOWER_FN}(t.description), ?{0}) > 0)",
                        param_idx
                    ));
                    params_vec.push(Box::new(search_needle(search)));
                }
            }

            let count_sql = format!("SELECT COUNT(*) FROM tasks t{conditions}");
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();
            let total: i64 = conn.query_row(&count_sql, params_refs.as_slice(), |row| row.get(0))?;

            let limit = filters.limit.max(1);
            let offset = (filters.page.max(1) - 1) as i64 * limit as i64;
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks t{conditions}{} LIMIT {} OFFSET {}",
                build_order_clause(filters.sort_by, filters.sort_order),
                limit,
                offset
            );

            let mut stmt = conn.prepare(&sql)?;
            let tasks = stmt
                .query_map(params_refs.as_slice(), |row| task_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(TaskPage {
                tasks: attach_details(conn, tasks)?,
                total,
            })
        })
    }

    /// Get a task with owner and shares if the user can see it.
    pub fn get_task(&self, task_id: TaskId, user_id: &str) -> Result<Option<TaskWithDetails>> {
        self.with_conn(|conn| {
            let task = conn
                .query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?2 AND {VISIBLE_TO_USER}"),
                    params![user_id, task_id],
                    |row| task_from_row(row, 0),
                )
                .optional()?;

            match task {
                Some(task) => Ok(attach_details(conn, vec![task])?.into_iter().next()),
                None => Ok(None),
            }
        })
    }

    /// Effective permission of a user on a task, `None` when the task does not exist.
    pub fn task_permission(&self, task_id: TaskId, user_id: &str) -> Result<Option<Permission>> {
        self.with_conn(|conn| {
            Ok(load_with_permission(conn, task_id, user_id)?.map(|(_, permission)| permission))
        })
    }

    /// Create a task owned by `owner_id`.
    pub fn create_task(&self, owner_id: &str, input: &NewTask) -> Result<Task> {
        let now = now_ms();
        let completed_at = completion_timestamp(TaskStatus::Pending, None, input.status, now);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (title, description, status, priority, due_date, completed_at,
                                    owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    input.title,
                    input.description,
                    input.status,
                    input.priority,
                    input.due_date.map(|d| d.timestamp_millis()),
                    completed_at,
                    owner_id,
                    now,
                ],
            )?;

            let id = conn.last_insert_rowid();
            load_task(conn, id)?.ok_or_else(|| anyhow!("Task {} vanished after insert", id))
        })
    }

    /// Apply a partial update. Returns `None` when the task is missing or the
    /// user lacks edit rights.
    pub fn update_task(
        &self,
        task_id: TaskId,
        user_id: &str,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some((task, permission)) = load_with_permission(&tx, task_id, user_id)? else {
                return Ok(None);
            };
            if !permission.can_edit() {
                return Ok(None);
            }

            let now = now_ms();
            let title = update.title.clone().unwrap_or_else(|| task.title.clone());
            let description = match &update.description {
                Some(description) => description.clone(),
                None => task.description.clone(),
            };
            let status = update.status.unwrap_or(task.status);
            let priority = update.priority.unwrap_or(task.priority);
            let due_date = match update.due_date {
                Some(due_date) => due_date,
                None => task.due_date,
            };
            let completed_at = completion_timestamp(
                task.status,
                task.completed_at.map(|d| d.timestamp_millis()),
                status,
                now,
            );

            tx.execute(
                "UPDATE tasks SET title = ?1, description = ?2, status = ?3, priority = ?4,
                                  due_date = ?5, completed_at = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    title,
                    description,
                    status,
                    priority,
                    due_date.map(|d| d.timestamp_millis()),
                    completed_at,
                    now,
                    task_id,
                ],
            )?;

            let updated = load_task(&tx, task_id)?
                .ok_or_else(|| anyhow!("Task {} vanished during update", task_id))?;
            tx.commit()?;
            Ok(Some(updated))
        })
    }

    /// Delete a task. Only the owner may; shares and activity cascade.
    pub fn delete_task(&self, task_id: TaskId, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some((_, permission)) = load_with_permission(&tx, task_id, user_id)? else {
                return Ok(false);
            };
            if !permission.can_delete() {
                return Ok(false);
            }

            let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    /// Users entitled to hear about a task: the owner and every share holder.
    pub fn task_audience(&self, task_id: TaskId) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT owner_id FROM tasks WHERE id = ?1
                 UNION
                 SELECT user_id FROM task_shares WHERE task_id = ?1",
            )?;
            let audience = stmt
                .query_map(params![task_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(audience)
        })
    }
}
