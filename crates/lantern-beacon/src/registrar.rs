//! Lighthouse self-registration and heartbeat.
//!
//! When a lighthouse URL is configured, the beacon announces itself once at
//! start-up and then heartbeats every minute with the scheduler state and a
//! coarse service census. Failures are logged and retried on the next tick;
//! the beacon works fine without a reachable lighthouse.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::AnalysisEngine;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CENSUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawn the registrar task. No-op when `LIGHTHOUSE_URL` is unset.
pub fn spawn(engine: Arc<AnalysisEngine>) {
    let Some(lighthouse) = engine.config().lighthouse_url.clone() else {
        debug!("no lighthouse configured, skipping registration");
        return;
    };

    tokio::spawn(async move {
        let http = reqwest::Client::new();
        register(&http, &lighthouse, &engine).await;
        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            heartbeat(&http, &lighthouse, &engine).await;
        }
    });
}

async fn register(http: &reqwest::Client, lighthouse: &str, engine: &AnalysisEngine) {
    let config = engine.config();
    let body = json!({
        "beacon_id": config.beacon_id,
        "domain": config.beacon_domain,
        "ai_engine_url": config.engine_url,
        "bundle_id": config.beacon_bundle,
        "version": env!("CARGO_PKG_VERSION"),
    });

    let result = http
        .post(format!("{lighthouse}/api/v1/beacons/register"))
        .timeout(REQUEST_TIMEOUT)
        .json(&body)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);
    match result {
        Ok(_) => info!("registered with lighthouse at {lighthouse}"),
        Err(e) => warn!("lighthouse registration failed: {e}"),
    }
}

async fn heartbeat(http: &reqwest::Client, lighthouse: &str, engine: &AnalysisEngine) {
    let (healthy, total) = service_census().await;
    let body = json!({
        "beacon_id": engine.config().beacon_id,
        "ai_engine_status": if engine.is_running() { "running" } else { "stopped" },
        "services_healthy": healthy,
        "services_total": total,
    });

    let result = http
        .post(format!("{lighthouse}/api/v1/beacons/heartbeat"))
        .timeout(REQUEST_TIMEOUT)
        .json(&body)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);
    if let Err(e) = result {
        warn!("lighthouse heartbeat failed: {e}");
    }
}

/// Count running vs. loaded service units. Best effort: (0, 0) when
/// systemctl is unavailable.
async fn service_census() -> (u32, u32) {
    let running = count_units(&["--state=running"]).await;
    let total = count_units(&["--all"]).await;
    (running, total)
}

async fn count_units(extra: &[&str]) -> u32 {
    let mut args = vec!["list-units", "--type=service", "--no-legend", "--plain", "--no-pager"];
    args.extend_from_slice(extra);

    let output = Command::new("systemctl")
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(CENSUS_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count() as u32,
        _ => 0,
    }
}
