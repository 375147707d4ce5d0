//! SSH execution on beacons with short-lived certificates.
//!
//! Key material lives only inside a scoped temp directory for the duration
//! of one command and is removed with it. The remote sshd enforces the
//! certificate's validity window and forced command; this client only
//! enforces a local timeout.

use std::time::Duration;

use tokio::process::Command;
use tracing::error;

/// Outcome of one remote command.
#[derive(Debug, Clone)]
pub struct SshResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// SSH to `beacon_ip` with a certificate and run `command`.
///
/// Failures (spawn errors, timeouts) come back as an `SshResult` with a
/// non-zero exit code, never as an error.
pub async fn execute_on_beacon(
    beacon_ip: &str,
    certificate: &str,
    private_key: &str,
    command: &str,
    username: &str,
    timeout: Duration,
) -> SshResult {
    let tmpdir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("could not create temp dir for SSH key material: {e}");
            return SshResult {
                stdout: String::new(),
                stderr: e.to_string(),
                exit_code: 1,
            };
        }
    };

    let key_path = tmpdir.path().join("key");
    let cert_path = tmpdir.path().join("key-cert.pub");
    if let Err(e) = write_key_material(&key_path, private_key, 0o600)
        .and_then(|()| write_key_material(&cert_path, certificate, 0o644))
    {
        error!("could not write SSH key material: {e}");
        return SshResult {
            stdout: String::new(),
            stderr: e.to_string(),
            exit_code: 1,
        };
    }

    let cert_opt = format!("CertificateFile={}", cert_path.display());
    let output = Command::new("ssh")
        .args([
            "-o",
            "StrictHostKeyChecking=accept-new",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "BatchMode=yes",
            "-o",
            "ConnectTimeout=10",
            "-o",
            &cert_opt,
            "-i",
        ])
        .arg(&key_path)
        .args(["-l", username, beacon_ip, command])
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Ok(Ok(out)) => SshResult {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            exit_code: out.status.code().unwrap_or(0),
        },
        Ok(Err(e)) => {
            error!("ssh to {username}@{beacon_ip} failed to spawn: {e}");
            SshResult {
                stdout: String::new(),
                stderr: e.to_string(),
                exit_code: 1,
            }
        }
        Err(_) => {
            error!("ssh to {username}@{beacon_ip} timed out after {timeout:?}");
            SshResult {
                stdout: String::new(),
                stderr: "Command timed out".to_string(),
                exit_code: 124,
            }
        }
    }
}

fn write_key_material(path: &std::path::Path, content: &str, mode: u32) -> std::io::Result<()> {
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_key_material_modes() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key");
        write_key_material(&key, "secret", 0o600).unwrap();
        let mode = std::fs::metadata(&key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_result_not_an_error() {
        // ssh exits non-zero quickly with BatchMode and a bad host.
        let result = execute_on_beacon(
            "127.0.0.1",
            "not-a-cert",
            "not-a-key",
            "true",
            "wopr-diag",
            Duration::from_secs(15),
        )
        .await;
        assert_ne!(result.exit_code, 0);
    }
}
