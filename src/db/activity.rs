//! Append-only activity log.

use super::{Database, USER_COLUMNS, ms_to_datetime, now_ms, user_from_row};
use crate::types::{ActivityDetails, ActivityWithUser, TaskActivity, TaskId};
use anyhow::Result;
use rusqlite::{Row, params};

fn parse_details(raw: Option<String>) -> ActivityDetails {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn parse_activity_row(row: &Row) -> rusqlite::Result<TaskActivity> {
    Ok(TaskActivity {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        action: row.get(3)?,
        details: parse_details(row.get(4)?),
        created_at: ms_to_datetime(row.get(5)?),
    })
}

impl Database {
    /// Append an activity entry.
    pub fn record_activity(
        &self,
        task_id: TaskId,
        user_id: &str,
        action: &str,
        details: &ActivityDetails,
    ) -> Result<TaskActivity> {
        let now = now_ms();
        let details_json = serde_json::to_string(details)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO task_activities (task_id, user_id, action, details, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![task_id, user_id, action, details_json, now],
            )?;

            Ok(TaskActivity {
                id: conn.last_insert_rowid(),
                task_id,
                user_id: user_id.to_string(),
                action: action.to_string(),
                details: details.clone(),
                created_at: ms_to_datetime(now),
            })
        })
    }

    /// Activity for a task, newest first.
    pub fn get_activities(&self, task_id: TaskId) -> Result<Vec<ActivityWithUser>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT a.id, a.task_id, a.user_id, a.action, a.details, a.created_at, {USER_COLUMNS}
                 FROM task_activities a
                 JOIN users u ON u.id = a.user_id
                 WHERE a.task_id = ?1
                 ORDER BY a.created_at DESC, a.id DESC"
            ))?;
            let activities = stmt
                .query_map(params![task_id], |row| {
                    Ok(ActivityWithUser {
                        activity: parse_activity_row(row)?,
                        user: user_from_row(row, 6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(activities)
        })
    }
}
