//! Share grants between a task owner and other users.

use super::tasks::{load_task_shares, load_with_permission};
use super::{Database, SHARE_COLUMNS, USER_COLUMNS, now_ms, share_from_row, user_from_row};
use crate::error::ApiError;
use crate::types::{SharePermission, ShareWithUser, TaskId, TaskShare, User};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

/// What `share_task` did to the grant table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Created(TaskShare),
    /// Existing grant moved to a new permission level.
    Updated(TaskShare),
    /// Existing grant already had the requested permission.
    Unchanged(TaskShare),
}

impl ShareOutcome {
    pub fn share(&self) -> &TaskShare {
        match self {
            ShareOutcome::Created(s) | ShareOutcome::Updated(s) | ShareOutcome::Unchanged(s) => s,
        }
    }

    pub fn into_share(self) -> TaskShare {
        match self {
            ShareOutcome::Created(s) | ShareOutcome::Updated(s) | ShareOutcome::Unchanged(s) => s,
        }
    }

    /// True when the stored grant changed.
    pub fn is_change(&self) -> bool {
        !matches!(self, ShareOutcome::Unchanged(_))
    }
}

fn load_share(conn: &Connection, task_id: TaskId, user_id: &str) -> Result<Option<TaskShare>> {
    let share = conn
        .query_row(
            &format!("SELECT {SHARE_COLUMNS} FROM task_shares s WHERE s.task_id = ?1 AND s.user_id = ?2"),
            params![task_id, user_id],
            |row| share_from_row(row, 0),
        )
        .optional()?;
    Ok(share)
}

fn load_user(conn: &Connection, sql_filter: &str, value: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE {sql_filter}"),
            params![value],
            |row| user_from_row(row, 0),
        )
        .optional()?;
    Ok(user)
}

impl Database {
    /// Grant `permission` on a task to the user registered under `recipient_email`.
    ///
    /// Only the owner may share. A task the caller cannot see reports as
    /// not found. An existing grant is updated in place.
    pub fn share_task(
        &self,
        task_id: TaskId,
        acting_user_id: &str,
        recipient_email: &str,
        permission: SharePermission,
    ) -> Result<ShareOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let (task, access) = match load_with_permission(&tx, task_id, acting_user_id)? {
                Some((task, access)) if access.can_view() => (task, access),
                _ => return Err(ApiError::task_not_found(task_id).into()),
            };
            if !access.can_share() {
                return Err(ApiError::forbidden("Only the task owner can share this task").into());
            }

            let acting = load_user(&tx, "u.id = ?1", acting_user_id)?
                .ok_or_else(|| ApiError::user_not_found(acting_user_id))?;
            let email = recipient_email.trim();
            if acting.email.eq_ignore_ascii_case(email) {
                return Err(ApiError::invalid_share_target("Cannot share a task with yourself").into());
            }

            let recipient = load_user(&tx, "u.email = ?1 COLLATE NOCASE", email)?
                .ok_or_else(|| ApiError::recipient_not_found(email))?;
            if recipient.id == task.owner_id {
                return Err(ApiError::invalid_share_target("Cannot share a task with its owner").into());
            }

            let outcome = match load_share(&tx, task_id, &recipient.id)? {
                Some(existing) if existing.permission == permission => {
                    ShareOutcome::Unchanged(existing)
                }
                Some(existing) => {
                    tx.execute(
                        "UPDATE task_shares SET permission = ?1, created_at = ?2 WHERE id = ?3",
                        params![permission, now_ms(), existing.id],
                    )?;
                    let share = load_share(&tx, task_id, &recipient.id)?
                        .ok_or_else(|| anyhow!("Share {} vanished during update", existing.id))?;
                    ShareOutcome::Updated(share)
                }
                None => {
                    tx.execute(
                        "INSERT INTO task_shares (task_id, user_id, permission, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![task_id, recipient.id, permission, now_ms()],
                    )?;
                    let share = load_share(&tx, task_id, &recipient.id)?
                        .ok_or_else(|| anyhow!("Share for task {} vanished after insert", task_id))?;
                    ShareOutcome::Created(share)
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Revoke a grant. Authorization is the caller's job.
    pub fn remove_share(&self, task_id: TaskId, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM task_shares WHERE task_id = ?1 AND user_id = ?2",
                params![task_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Raw grants on a task, oldest first.
    pub fn shares_for_task(&self, task_id: TaskId) -> Result<Vec<TaskShare>> {
        self.with_conn(|conn| load_task_shares(conn, task_id))
    }

    /// Every grant on a task joined with the grantee.
    pub fn list_shares(&self, task_id: TaskId) -> Result<Vec<ShareWithUser>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SHARE_COLUMNS}, {USER_COLUMNS}
                 FROM task_shares s
                 JOIN users u ON u.id = s.user_id
                 WHERE s.task_id = ?1
                 ORDER BY s.created_at, s.id"
            ))?;
            let shares = stmt
                .query_map(params![task_id], |row| {
                    Ok(ShareWithUser {
                        share: share_from_row(row, 0)?,
                        user: user_from_row(row, 5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(shares)
        })
    }
}
