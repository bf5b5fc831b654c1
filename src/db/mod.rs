//! Database layer for the task server.

pub mod activity;
pub mod shares;
pub mod stats;
pub mod tasks;
pub mod users;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{SharePermission, Task, TaskPriority, TaskShare, TaskStatus, User};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// SQL predicate: task `t` is visible to the user bound as `?1`.
pub(crate) const VISIBLE_TO_USER: &str = "(t.owner_id = ?1 OR EXISTS (
    SELECT 1 FROM task_shares vs WHERE vs.task_id = t.id AND vs.user_id = ?1))";

pub(crate) const USER_COLUMNS: &str =
    "u.id, u.email, u.display_name, u.avatar_url, u.created_at, u.updated_at";

pub(crate) const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.status, t.priority, \
     t.due_date, t.completed_at, t.owner_id, t.created_at, t.updated_at";

pub(crate) const SHARE_COLUMNS: &str = "s.id, s.task_id, s.user_id, s.permission, s.created_at";

/// Unicode-aware lowercase; SQLite's built-in `lower()` and `LIKE` only fold ASCII.
pub(crate) const LOWER_FN: &str = "taskhub_lower";

fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        LOWER_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )?;
    Ok(())
}

/// Database handle wrapping a SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL so readers are not blocked by the single writer
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;
        register_functions(&conn)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        register_functions(&conn)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.lock()?;
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a function with mutable access to the connection (for transactions).
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.lock()?;
        f(&mut conn)
    }
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Local midnight of the given calendar date, in epoch milliseconds.
pub fn local_midnight_ms(date: NaiveDate) -> i64 {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(dt) => dt.timestamp_millis(),
        // Midnight skipped by a DST jump; fall back to UTC interpretation
        None => midnight.and_utc().timestamp_millis(),
    }
}

/// Start of the current local day in epoch milliseconds.
pub fn start_of_today_ms() -> i64 {
    local_midnight_ms(Local::now().date_naive())
}

pub(crate) fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub(crate) fn opt_ms_to_datetime(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(ms_to_datetime)
}

/// Store text enums under their wire names.
macro_rules! sql_text_enum {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e| FromSqlError::Other(Box::new(e)))
                }
            }
        )*
    };
}

sql_text_enum!(TaskStatus, TaskPriority, SharePermission);

/// Parse a user from `USER_COLUMNS` starting at column `start`.
pub(crate) fn user_from_row(row: &Row, start: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(start)?,
        email: row.get(start + 1)?,
        display_name: row.get(start + 2)?,
        avatar_url: row.get(start + 3)?,
        created_at: ms_to_datetime(row.get(start + 4)?),
        updated_at: ms_to_datetime(row.get(start + 5)?),
    })
}

/// Parse a task from `TASK_COLUMNS` starting at column `start`.
pub(crate) fn task_from_row(row: &Row, start: usize) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(start)?,
        title: row.get(start + 1)?,
        description: row.get(start + 2)?,
        status: row.get(start + 3)?,
        priority: row.get(start + 4)?,
        due_date: opt_ms_to_datetime(row.get(start + 5)?),
        completed_at: opt_ms_to_datetime(row.get(start + 6)?),
        owner_id: row.get(start + 7)?,
        created_at: ms_to_datetime(row.get(start + 8)?),
        updated_at: ms_to_datetime(row.get(start + 9)?),
    })
}

/// Parse a share from `SHARE_COLUMNS` starting at column `start`.
pub(crate) fn share_from_row(row: &Row, start: usize) -> rusqlite::Result<TaskShare> {
    Ok(TaskShare {
        id: row.get(start)?,
        task_id: row.get(start + 1)?,
        user_id: row.get(start + 2)?,
        permission: row.get(start + 3)?,
        created_at: ms_to_datetime(row.get(start + 4)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midnight_is_not_after_now() {
        let start = start_of_today_ms();
        let now = now_ms();
        assert!(start <= now);
        assert!(now - start < DAY_MS + 60 * 60 * 1000);
    }

    #[test]
    fn enums_survive_storage() {
        let db = Database::open_in_memory().unwrap();
        let status: TaskStatus = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT ?1", [TaskStatus::InProgress], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(status, TaskStatus::InProgress);
    }

    #[test]
    fn unknown_enum_text_is_a_conversion_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<TaskPriority> = db.with_conn(|conn| {
            Ok(conn.query_row("SELECT 'urgent'", [], |row| row.get(0))?)
        });
        assert!(result.is_err());
    }
}
