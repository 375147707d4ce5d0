//! Certificate signing behind a trait seam.
//!
//! Production signing shells out to `ssh-keygen -s`; the trait lets the HTTP
//! layer be exercised with a stub. Key material only ever exists inside a
//! scoped temp directory and every certificate carries the standard
//! restrictions (no agent/port/X11 forwarding) plus a fresh 63-bit serial.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::error::CaError;

const KEYGEN_TIMEOUT: Duration = Duration::from_secs(30);

/// An ephemeral keypair generated for a single issuance.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub private_key: String,
    pub public_key: String,
}

/// A signed certificate and its serial.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    pub certificate: String,
    pub serial: u64,
}

/// Parameters for one signing operation.
#[derive(Debug, Clone)]
pub struct SignParams {
    pub user_pubkey: String,
    /// Recorded in the cert for the audit trail: requester, tier, beacon.
    pub identity: String,
    pub principals: Vec<String>,
    pub validity_seconds: u64,
    pub force_command: Option<String>,
}

/// Signing seam.
#[async_trait]
pub trait CertSigner: Send + Sync {
    /// Generate an ephemeral Ed25519 keypair. Never persisted.
    async fn generate_keypair(&self) -> Result<Keypair, CaError>;

    /// Sign a user public key.
    async fn sign_user_key(&self, params: SignParams) -> Result<SignedCertificate, CaError>;
}

/// Fresh 63-bit random serial.
#[must_use]
pub fn fresh_serial() -> u64 {
    rand::random::<u64>() >> 1
}

/// Production signer wrapping `ssh-keygen`.
pub struct SshKeygenSigner {
    ca_key_path: PathBuf,
}

impl SshKeygenSigner {
    #[must_use]
    pub fn new(ca_key_path: impl Into<PathBuf>) -> Self {
        Self {
            ca_key_path: ca_key_path.into(),
        }
    }

    async fn run_keygen(args: Vec<String>) -> Result<(), CaError> {
        let output = Command::new("ssh-keygen")
            .args(&args)
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(KEYGEN_TIMEOUT, output)
            .await
            .map_err(|_| CaError::Signing("ssh-keygen timed out".to_string()))?
            .map_err(|e| CaError::Signing(e.to_string()))?;
        if !output.status.success() {
            return Err(CaError::Signing(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CertSigner for SshKeygenSigner {
    async fn generate_keypair(&self) -> Result<Keypair, CaError> {
        let tmpdir = tempfile::tempdir().map_err(|e| CaError::Signing(e.to_string()))?;
        let key_path = tmpdir.path().join("session_key");

        Self::run_keygen(vec![
            "-t".to_string(),
            "ed25519".to_string(),
            "-f".to_string(),
            key_path.display().to_string(),
            "-N".to_string(),
            String::new(),
            "-q".to_string(),
            "-C".to_string(),
            "lantern-support-session".to_string(),
        ])
        .await?;

        let private_key = std::fs::read_to_string(&key_path)
            .map_err(|e| CaError::Signing(format!("reading generated key: {e}")))?;
        let public_key = std::fs::read_to_string(key_path.with_extension("pub"))
            .map_err(|e| CaError::Signing(format!("reading generated key: {e}")))?;
        Ok(Keypair {
            private_key,
            public_key,
        })
    }

    async fn sign_user_key(&self, params: SignParams) -> Result<SignedCertificate, CaError> {
        let serial = fresh_serial();
        let tmpdir = tempfile::tempdir().map_err(|e| CaError::Signing(e.to_string()))?;
        let pubkey_path = tmpdir.path().join("user_key.pub");
        std::fs::write(&pubkey_path, &params.user_pubkey)
            .map_err(|e| CaError::Signing(e.to_string()))?;

        let mut args = vec![
            "-s".to_string(),
            self.ca_key_path.display().to_string(),
            "-I".to_string(),
            params.identity.clone(),
            "-n".to_string(),
            params.principals.join(","),
            "-V".to_string(),
            format!("+{}s", params.validity_seconds),
            "-z".to_string(),
            serial.to_string(),
        ];
        if let Some(force_command) = &params.force_command {
            args.push("-O".to_string());
            args.push(format!("force-command={force_command}"));
        }
        for restriction in [
            "no-agent-forwarding",
            "no-port-forwarding",
            "no-x11-forwarding",
        ] {
            args.push("-O".to_string());
            args.push(restriction.to_string());
        }
        args.push(pubkey_path.display().to_string());

        info!(
            "signing certificate: identity={} principals={:?} validity={}s serial={serial}",
            params.identity, params.principals, params.validity_seconds
        );
        Self::run_keygen(args).await?;

        // ssh-keygen writes the certificate next to the public key.
        let cert_path = tmpdir.path().join("user_key-cert.pub");
        let certificate = std::fs::read_to_string(&cert_path)
            .map_err(|_| CaError::Signing("certificate file not created".to_string()))?;

        Ok(SignedCertificate {
            certificate: certificate.trim().to_string(),
            serial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_fits_63_bits() {
        for _ in 0..64 {
            assert!(fresh_serial() < (1u64 << 63));
        }
    }

    #[test]
    fn test_serials_are_not_repeating() {
        let a = fresh_serial();
        let b = fresh_serial();
        let c = fresh_serial();
        assert!(!(a == b && b == c));
    }
}
