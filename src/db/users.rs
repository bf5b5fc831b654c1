//! User persistence.

use super::{Database, USER_COLUMNS, now_ms, user_from_row};
use crate::types::{UpsertUser, User};
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

impl Database {
    /// Insert or refresh a user keyed by the provider subject id.
    ///
    /// A missing display name falls back to the local part of the email.
    pub fn upsert_user(&self, input: &UpsertUser) -> Result<User> {
        let now = now_ms();
        let display_name = input
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| input.email.split('@').next().unwrap_or_default().to_string());
        let avatar_url = input.avatar_url.clone().unwrap_or_default();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, display_name, avatar_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    email = excluded.email,
                    display_name = excluded.display_name,
                    avatar_url = excluded.avatar_url,
                    updated_at = excluded.updated_at",
                params![input.id, input.email, display_name, avatar_url, now],
            )?;

            let user = conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
                params![input.id],
                |row| user_from_row(row, 0),
            )?;
            Ok(user)
        })
    }

    /// Get a user by id.
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
                    params![user_id],
                    |row| user_from_row(row, 0),
                )
                .optional()?;
            Ok(user)
        })
    }

    /// Look up a user by email, ignoring case and surrounding whitespace.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1 COLLATE NOCASE"),
                    params![email.trim()],
                    |row| user_from_row(row, 0),
                )
                .optional()?;
            Ok(user)
        })
    }
}
