//! Error collection from the system journal and optional audit stores.
//!
//! The engine pulls from every configured [`ErrorSource`] at the start of a
//! cycle. A source that fails returns an empty batch; collection never
//! surfaces an error into the cycle.

use std::collections::HashMap;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Row};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::models::{ErrorOrigin, ErrorRecord};

const JOURNAL_TIMEOUT: Duration = Duration::from_secs(10);
const AUDIT_ROW_CAP: i64 = 50;

/// A feed of recent error records.
#[async_trait]
pub trait ErrorSource: Send + Sync {
    /// Collect errors newer than `window`. Never fails; a broken source
    /// yields an empty batch.
    async fn collect(&self, window: Duration) -> Vec<ErrorRecord>;
}

/// Errors from `journalctl` at priority `err` and above.
pub struct JournalSource;

#[async_trait]
impl ErrorSource for JournalSource {
    async fn collect(&self, window: Duration) -> Vec<ErrorRecord> {
        let minutes = (window.as_secs() / 60).max(1);
        let since = format!("{minutes} min ago");

        let output = Command::new("journalctl")
            .args([
                "--since",
                &since,
                "-p",
                "err",
                "--no-pager",
                "-o",
                "json",
                "--output-fields=UNIT,_SYSTEMD_UNIT,SYSLOG_IDENTIFIER,CONTAINER_NAME,MESSAGE,_PID",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(JOURNAL_TIMEOUT, output).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                debug!("journalctl unavailable: {e}");
                return Vec::new();
            }
            Err(_) => {
                warn!("journalctl timed out after {JOURNAL_TIMEOUT:?}");
                return Vec::new();
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .filter(|line| !line.is_empty())
            .filter_map(parse_journal_line)
            .collect()
    }
}

fn parse_journal_line(line: &str) -> Option<ErrorRecord> {
    let entry: serde_json::Value = serde_json::from_str(line).ok()?;
    let field = |name: &str| entry.get(name).and_then(|v| v.as_str());

    // Service identity, in decreasing order of specificity.
    let mut unit = field("UNIT")
        .or_else(|| field("_SYSTEMD_UNIT"))
        .or_else(|| field("CONTAINER_NAME"))
        .or_else(|| field("SYSLOG_IDENTIFIER"))
        .unwrap_or("unknown");
    unit = unit.strip_suffix(".service").unwrap_or(unit);

    Some(ErrorRecord {
        origin: ErrorOrigin::Journal,
        service: unit.to_string(),
        severity: "error".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        message: field("MESSAGE").unwrap_or_default().to_string(),
        request_path: None,
        response_status: None,
        duration_ms: None,
    })
}

/// Errors from per-service audit-store SQLite databases.
pub struct AuditStoreSource {
    stores: HashMap<String, String>,
}

impl AuditStoreSource {
    #[must_use]
    pub fn new(stores: HashMap<String, String>) -> Self {
        Self { stores }
    }

    async fn collect_one(service: &str, url: &str, cutoff: &str) -> Option<Vec<ErrorRecord>> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url).ok()?
        } else {
            SqliteConnectOptions::new().filename(url)
        }
        .read_only(true);

        let mut conn = options.connect().await.ok()?;
        let rows = sqlx::query(
            "SELECT action, severity, timestamp, response_status, request_path, duration_ms \
             FROM audit_log WHERE severity IN ('error', 'critical') AND timestamp > ? \
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(cutoff)
        .bind(AUDIT_ROW_CAP)
        .fetch_all(&mut conn)
        .await
        .ok()?;

        Some(
            rows.into_iter()
                .map(|row| ErrorRecord {
                    origin: ErrorOrigin::AuditStore,
                    service: service.to_string(),
                    severity: row.try_get("severity").unwrap_or_else(|_| "error".to_string()),
                    timestamp: row.try_get("timestamp").unwrap_or_default(),
                    message: row.try_get("action").unwrap_or_default(),
                    request_path: row.try_get("request_path").ok(),
                    response_status: row.try_get("response_status").ok(),
                    duration_ms: row.try_get("duration_ms").ok(),
                })
                .collect(),
        )
    }
}

#[async_trait]
impl ErrorSource for AuditStoreSource {
    async fn collect(&self, window: Duration) -> Vec<ErrorRecord> {
        let cutoff = (chrono::Utc::now()
            - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::minutes(5)))
        .to_rfc3339();

        let mut errors = Vec::new();
        for (service, url) in &self.stores {
            match Self::collect_one(service, url, &cutoff).await {
                Some(mut batch) => errors.append(&mut batch),
                // Store may not exist or be locked; treat as quiet.
                None => debug!("audit store for {service} unavailable, skipping"),
            }
        }
        errors
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_line_prefers_unit_field() {
        let line = r#"{"UNIT":"caddy.service","_SYSTEMD_UNIT":"init.scope","MESSAGE":"boom"}"#;
        let rec = parse_journal_line(line).unwrap();
        assert_eq!(rec.service, "caddy");
        assert_eq!(rec.message, "boom");
    }

    #[test]
    fn test_journal_line_falls_back_through_fields() {
        let line = r#"{"SYSLOG_IDENTIFIER":"kernel","MESSAGE":"oops"}"#;
        let rec = parse_journal_line(line).unwrap();
        assert_eq!(rec.service, "kernel");

        let line = r#"{"CONTAINER_NAME":"web","SYSLOG_IDENTIFIER":"docker","MESSAGE":"x"}"#;
        let rec = parse_journal_line(line).unwrap();
        assert_eq!(rec.service, "web");
    }

    #[test]
    fn test_journal_line_unknown_service() {
        let rec = parse_journal_line(r#"{"MESSAGE":"orphan"}"#).unwrap();
        assert_eq!(rec.service, "unknown");
    }

    #[test]
    fn test_journal_line_strips_service_suffix() {
        let line = r#"{"_SYSTEMD_UNIT":"lantern-redis.service","MESSAGE":"x"}"#;
        assert_eq!(parse_journal_line(line).unwrap().service, "lantern-redis");
    }

    #[test]
    fn test_malformed_journal_line_is_skipped() {
        assert!(parse_journal_line("not json").is_none());
    }

    #[tokio::test]
    async fn test_missing_audit_store_collects_nothing() {
        let mut stores = HashMap::new();
        stores.insert(
            "ghost".to_string(),
            "/nonexistent/path/audit.db".to_string(),
        );
        let source = AuditStoreSource::new(stores);
        let errors = source.collect(Duration::from_secs(300)).await;
        assert!(errors.is_empty());
    }
}
