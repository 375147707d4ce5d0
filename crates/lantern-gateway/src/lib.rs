//! Central support gateway for the Lantern fleet remediation plane.
//!
//! The gateway is the lighthouse-side HTTP surface operators use to look at
//! and act on beacons. Every route is gated by the three-tier access model
//! from `lantern-core`; every authenticated request lands in the append-only
//! audit log before its response is returned. Remote execution always goes
//! through a certificate freshly minted by the SSH CA - the gateway itself
//! holds no standing credentials on any beacon.

pub mod audit;
pub mod breakglass;
pub mod ca;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod proxy;
pub mod registry;
pub mod remediation;
pub mod server;
pub mod ssh;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use server::AppState;
