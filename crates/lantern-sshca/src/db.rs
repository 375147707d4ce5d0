//! Shared-store access for breakglass session validation.
//!
//! The CA reads (never writes) the gateway's `breakglass_sessions` table.
//! The table definition here matches the gateway's and only materializes
//! when the CA starts against a fresh database.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::Result;

const ENSURE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS breakglass_sessions (
    id TEXT PRIMARY KEY,
    user_uid TEXT NOT NULL,
    username TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    target_beacon_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    ended_at TEXT,
    reason TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    ssh_cert_serial TEXT NOT NULL DEFAULT '',
    revoked_by TEXT
);
"#;

/// Connect to the shared store.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .unwrap_or_else(|_| SqliteConnectOptions::new().filename(database_url))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    sqlx::raw_sql(ENSURE_SESSIONS_TABLE).execute(&pool).await?;
    Ok(pool)
}

/// In-memory store for tests.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap_or_default();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    sqlx::raw_sql(ENSURE_SESSIONS_TABLE).execute(&pool).await?;
    Ok(pool)
}

/// Whether `session_id` names an active breakglass session.
pub async fn session_is_active(pool: &SqlitePool, session_id: &str) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM breakglass_sessions WHERE id = ? AND status = 'active'",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_is_active_checks_status() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO breakglass_sessions \
             (id, user_uid, target_beacon_id, started_at, expires_at, reason, status) \
             VALUES ('s1', 'u1', 'b1', '2026-01-01T00:00:00Z', '2026-01-01T00:20:00Z', \
                     'customer db wedged hard!!', 'active')",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(session_is_active(&pool, "s1").await.unwrap());
        assert!(!session_is_active(&pool, "ghost").await.unwrap());

        sqlx::query("UPDATE breakglass_sessions SET status = 'expired' WHERE id = 's1'")
            .execute(&pool)
            .await
            .unwrap();
        assert!(!session_is_active(&pool, "s1").await.unwrap());
    }
}
