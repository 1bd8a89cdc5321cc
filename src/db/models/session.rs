//! Session records keyed by bearer token.
//!
//! Expired rows are never purged; lookups simply stop returning them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Timestamp layout shared with SQLite's `CURRENT_TIMESTAMP`, so stored
/// values compare correctly as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: String,
    /// `None` means the session does not expire
    pub expires_at: Option<String>,
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Expiry for a session issued at `now`, or `None` if it is not representable
pub fn session_expiry(now: DateTime<Utc>, ttl_days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(ttl_days).and_then(|ttl| now.checked_add_signed(ttl))
}

/// Insert a session and return its id.
pub async fn create_session(
    db: &SqlitePool,
    user_id: i64,
    token: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at.map(format_timestamp))
        .execute(db)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Find the session for `token` if it is still usable at `now`.
pub async fn find_active_session(
    db: &SqlitePool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, user_id, token, created_at, expires_at
        FROM sessions
        WHERE token = ? AND (expires_at IS NULL OR expires_at > ?)
        LIMIT 1
        "#,
    )
    .bind(token)
    .bind(format_timestamp(now))
    .fetch_optional(db)
    .await
}

/// Delete the session for `token`, returning how many rows matched.
pub async fn delete_session(db: &SqlitePool, token: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
