//! Aggregation queries for analytics.

use super::{DAY_MS, Database, USER_COLUMNS, VISIBLE_TO_USER, local_midnight_ms, start_of_today_ms, user_from_row};
use crate::types::{ProductivityPoint, TaskStats, TeamMemberStats};
use anyhow::Result;
use chrono::{Days, Local, NaiveDate};
use rusqlite::params;

impl Database {
    /// Counts over every task visible to the user.
    pub fn get_stats(&self, user_id: &str) -> Result<TaskStats> {
        self.get_stats_at(user_id, start_of_today_ms())
    }

    /// Same as [`Database::get_stats`] with "today" starting at `today_start`.
    pub fn get_stats_at(&self, user_id: &str, today_start: i64) -> Result<TaskStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                &format!(
                    "SELECT
                        COUNT(*),
                        COUNT(CASE WHEN t.status = 'completed' THEN 1 END),
                        COUNT(CASE WHEN t.status = 'in-progress' THEN 1 END),
                        COUNT(CASE WHEN t.status = 'pending' THEN 1 END),
                        COUNT(CASE WHEN t.due_date < ?2 AND t.status != 'completed' THEN 1 END),
                        COUNT(CASE WHEN t.due_date >= ?2 AND t.due_date < ?3
                                    AND t.status != 'completed' THEN 1 END),
                        COUNT(CASE WHEN t.priority = 'high' THEN 1 END),
                        COUNT(CASE WHEN t.priority = 'medium' THEN 1 END),
                        COUNT(CASE WHEN t.priority = 'low' THEN 1 END)
                     FROM tasks t
                     WHERE {VISIBLE_TO_USER}"
                ),
                params![user_id, today_start, today_start + DAY_MS],
                |row| {
                    Ok(TaskStats {
                        total: row.get(0)?,
                        completed: row.get(1)?,
                        in_progress: row.get(2)?,
                        pending: row.get(3)?,
                        overdue: row.get(4)?,
                        due_today: row.get(5)?,
                        high_priority: row.get(6)?,
                        medium_priority: row.get(7)?,
                        low_priority: row.get(8)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    /// Per-day created/completed counts over the last `days` local dates,
    /// today included. Dates with no tasks are omitted.
    ///
    /// A task counts as completed on the day it was created if it is
    /// completed now, regardless of when it was completed.
    pub fn get_productivity(&self, user_id: &str, days: u32) -> Result<Vec<ProductivityPoint>> {
        self.get_productivity_at(user_id, days, Local::now().date_naive())
    }

    pub fn get_productivity_at(
        &self,
        user_id: &str,
        days: u32,
        today: NaiveDate,
    ) -> Result<Vec<ProductivityPoint>> {
        let first_day = today
            .checked_sub_days(Days::new(u64::from(days.max(1) - 1)))
            .unwrap_or(NaiveDate::MIN);
        let window_start = local_midnight_ms(first_day);
        let window_end = today
            .checked_add_days(Days::new(1))
            .map(local_midnight_ms)
            .unwrap_or(i64::MAX);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT date(t.created_at / 1000, 'unixepoch', 'localtime') AS day,
                        COUNT(CASE WHEN t.status = 'completed' THEN 1 END),
                        COUNT(*)
                 FROM tasks t
                 WHERE {VISIBLE_TO_USER} AND t.created_at >= ?2 AND t.created_at < ?3
                 GROUP BY day
                 ORDER BY day"
            ))?;
            let points = stmt
                .query_map(params![user_id, window_start, window_end], |row| {
                    Ok(ProductivityPoint {
                        date: row.get(0)?,
                        completed: row.get(1)?,
                        created: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(points)
        })
    }

    /// Visible tasks grouped by owner, busiest owners first.
    pub fn get_team_performance(&self, user_id: &str) -> Result<Vec<TeamMemberStats>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS},
                        COUNT(CASE WHEN t.status = 'completed' THEN 1 END),
                        COUNT(*) AS total
                 FROM tasks t
                 JOIN users u ON u.id = t.owner_id
                 WHERE {VISIBLE_TO_USER}
                 GROUP BY u.id
                 ORDER BY total DESC, u.display_name COLLATE NOCASE, u.id"
            ))?;
            let members = stmt
                .query_map(params![user_id], |row| {
                    Ok(TeamMemberStats {
                        user: user_from_row(row, 0)?,
                        completed_tasks: row.get(6)?,
                        total_tasks: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(members)
        })
    }
}
