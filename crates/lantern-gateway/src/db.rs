//! Shared-store schema bootstrap and common lookups.
//!
//! The gateway and the CA share one SQLite database through `DATABASE_URL`.
//! An unreachable database at start-up is fatal.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::Result;
use crate::models::BeaconInfo;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS beacons (
    beacon_id TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    ai_engine_url TEXT NOT NULL,
    public_ip TEXT NOT NULL,
    bundle_id TEXT NOT NULL,
    version TEXT NOT NULL,
    registered_at TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'online'
);

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

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    user_uid TEXT NOT NULL,
    username TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    action TEXT NOT NULL,
    target_beacon_id TEXT,
    access_tier TEXT NOT NULL,
    request_ip TEXT,
    request_method TEXT NOT NULL,
    request_path TEXT NOT NULL,
    request_body_hash TEXT,
    response_status INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS remediation_actions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    command_template TEXT NOT NULL,
    required_tier TEXT NOT NULL,
    is_enabled INTEGER NOT NULL DEFAULT 1,
    risk_level TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_time ON audit_log(timestamp);
CREATE INDEX IF NOT EXISTS idx_bg_status ON breakglass_sessions(status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_bg_one_active
    ON breakglass_sessions(user_uid, target_beacon_id) WHERE status = 'active';
"#;

const SEED_ACTIONS: &str = r#"
INSERT OR IGNORE INTO remediation_actions
    (id, name, description, command_template, required_tier, is_enabled, risk_level)
VALUES
    ('restart-service', 'Restart a service',
     'Restart a named systemd unit', 'systemctl restart {service}',
     'remediate', 1, 'low'),
    ('reload-caddy', 'Reload Caddy',
     'Reload the edge proxy without dropping connections', 'systemctl reload caddy',
     'remediate', 1, 'low'),
    ('clear-tmp', 'Clear old temp files',
     'Delete files under /tmp older than one day',
     'find /tmp -type f -mtime +1 -delete',
     'remediate', 1, 'low'),
    ('restart-container', 'Restart a container',
     'Restart a named container', 'docker restart {container}',
     'remediate', 1, 'medium'),
    ('disk-usage', 'Check disk usage',
     'Capture filesystem usage', 'df -h',
     'diag', 1, 'low');
"#;

/// Connect to the shared store and bootstrap the schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .unwrap_or_else(|_| SqliteConnectOptions::new().filename(database_url))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    sqlx::raw_sql(CREATE_TABLES).execute(&pool).await?;
    sqlx::raw_sql(SEED_ACTIONS).execute(&pool).await?;
    Ok(pool)
}

/// In-memory store for tests.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap_or_default();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    sqlx::raw_sql(CREATE_TABLES).execute(&pool).await?;
    sqlx::raw_sql(SEED_ACTIONS).execute(&pool).await?;
    Ok(pool)
}

/// Fetch one beacon's registry row.
pub async fn fetch_beacon(pool: &SqlitePool, beacon_id: &str) -> Result<Option<BeaconInfo>> {
    Ok(
        sqlx::query_as::<_, BeaconInfo>("SELECT * FROM beacons WHERE beacon_id = ?")
            .bind(beacon_id)
            .fetch_optional(pool)
            .await?,
    )
}
