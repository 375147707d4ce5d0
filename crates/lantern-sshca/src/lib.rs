//! Short-lived SSH certificate authority for the Lantern fleet.
//!
//! Signs ephemeral user certificates scoped to one of three access tiers.
//! Diagnostic and remediation certificates carry a forced command wrapper;
//! breakglass certificates are unrestricted but require an active, persisted
//! breakglass session. Validity is minutes, never hours, and enforcement is
//! the remote sshd's job - this service only refuses to sign.

pub mod config;
pub mod db;
pub mod error;
pub mod server;
pub mod signer;

pub use config::CaConfig;
pub use error::{CaError, Result};
