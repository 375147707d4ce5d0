//! Tier-1 action executor.
//!
//! A closed catalogue of local remedies, each a fixed argument vector run
//! through `tokio::process` with an enforced timeout and captured output.
//! Nothing here ever builds a shell string. The Safety Validator has already
//! gated by action kind before execution; the only check repeated here is
//! `restart_service`'s target, which must be in the hard-coded restartable
//! list.

use std::time::Duration;

use tokio::process::Command;
use tracing::info;

use crate::config::RESTARTABLE_SERVICES;

const LONG_TIMEOUT: Duration = Duration::from_secs(30);
const SHORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one action execution.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub output: String,
}

impl ActionOutcome {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Execute one allow-listed action against the local host.
pub async fn execute_action(action: &str, service: &str) -> ActionOutcome {
    match action {
        "restart_service" => restart_service(service).await,
        "clear_tmp" => clear_tmp().await,
        "rotate_logs" => rotate_logs().await,
        "check_disk_usage" => capture("df", &["-h"], SHORT_TIMEOUT).await,
        "check_memory" => capture("free", &["-h"], SHORT_TIMEOUT).await,
        "dns_flush" => dns_flush().await,
        other => ActionOutcome::failed(format!("Unknown action: {other}")),
    }
}

async fn restart_service(service: &str) -> ActionOutcome {
    if !RESTARTABLE_SERVICES.contains(&service) {
        return ActionOutcome::failed(format!("Service '{service}' not in restartable list"));
    }
    match run("systemctl", &["restart", service], LONG_TIMEOUT).await {
        RunResult::Finished(out) if out.status.success() => {
            info!("restarted service: {service}");
            ActionOutcome::ok(format!("Service {service} restarted successfully"))
        }
        RunResult::Finished(out) => ActionOutcome::failed(format!(
            "Restart failed: {}",
            String::from_utf8_lossy(&out.stderr)
        )),
        RunResult::TimedOut => ActionOutcome::failed("Restart timed out"),
        RunResult::SpawnError(e) => ActionOutcome::failed(e),
    }
}

async fn clear_tmp() -> ActionOutcome {
    match run(
        "find",
        &["/tmp", "-type", "f", "-mtime", "+1", "-delete"],
        LONG_TIMEOUT,
    )
    .await
    {
        RunResult::Finished(out) if out.status.success() => {
            ActionOutcome::ok("Cleared old temp files")
        }
        RunResult::Finished(out) => {
            ActionOutcome::failed(String::from_utf8_lossy(&out.stderr).into_owned())
        }
        RunResult::TimedOut => ActionOutcome::failed("clear_tmp timed out"),
        RunResult::SpawnError(e) => ActionOutcome::failed(e),
    }
}

async fn rotate_logs() -> ActionOutcome {
    match run("logrotate", &["-f", "/etc/logrotate.conf"], LONG_TIMEOUT).await {
        RunResult::Finished(out) => {
            let text = if out.stdout.is_empty() {
                String::from_utf8_lossy(&out.stderr).into_owned()
            } else {
                String::from_utf8_lossy(&out.stdout).into_owned()
            };
            ActionOutcome {
                success: out.status.success(),
                output: text,
            }
        }
        RunResult::TimedOut => ActionOutcome::failed("rotate_logs timed out"),
        RunResult::SpawnError(e) => ActionOutcome::failed(e),
    }
}

async fn dns_flush() -> ActionOutcome {
    match run("systemd-resolve", &["--flush-caches"], SHORT_TIMEOUT).await {
        RunResult::Finished(out) if out.status.success() => ActionOutcome::ok("DNS cache flushed"),
        RunResult::Finished(out) => {
            ActionOutcome::failed(String::from_utf8_lossy(&out.stderr).into_owned())
        }
        RunResult::TimedOut => ActionOutcome::failed("dns_flush timed out"),
        RunResult::SpawnError(e) => ActionOutcome::failed(e),
    }
}

/// Run a read-only capture command; success means the command ran.
async fn capture(program: &str, args: &[&str], timeout: Duration) -> ActionOutcome {
    match run(program, args, timeout).await {
        RunResult::Finished(out) => ActionOutcome {
            success: out.status.success(),
            output: String::from_utf8_lossy(&out.stdout).into_owned(),
        },
        RunResult::TimedOut => ActionOutcome::failed(format!("{program} timed out")),
        RunResult::SpawnError(e) => ActionOutcome::failed(e),
    }
}

enum RunResult {
    Finished(std::process::Output),
    TimedOut,
    SpawnError(String),
}

async fn run(program: &str, args: &[&str], timeout: Duration) -> RunResult {
    let fut = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(out)) => RunResult::Finished(out),
        Ok(Err(e)) => RunResult::SpawnError(e.to_string()),
        Err(_) => RunResult::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_action_fails_with_diagnostic() {
        let outcome = execute_action("defragment_everything", "caddy").await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("Unknown action"));
    }

    #[tokio::test]
    async fn test_restart_rejects_unlisted_service() {
        let outcome = execute_action("restart_service", "sshd").await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("not in restartable list"));
    }

    #[tokio::test]
    async fn test_container_actions_are_not_in_catalogue() {
        // Allow-listed for decisions, but not executable locally.
        let outcome = execute_action("restart_container", "web").await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("Unknown action"));
    }
}
