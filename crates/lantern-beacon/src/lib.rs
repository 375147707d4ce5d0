//! Per-beacon analysis engine for the Lantern fleet remediation plane.
//!
//! The engine runs on every beacon. On a fixed interval it collects recent
//! errors from the system journal and any configured audit stores, classifies
//! each affected service against a regex taxonomy (falling back to a local
//! JSON-mode language model), passes every candidate decision through a
//! downgrade-only safety validator, and then either executes an allow-listed
//! Tier-1 remedy under an hourly rate limit or opens a deduplicated
//! escalation for human review.
//!
//! The crate exposes:
//!
//! - [`engine::AnalysisEngine`] - one analysis cycle plus the periodic
//!   scheduler
//! - [`server::router`] - the beacon-local HTTP API the lighthouse proxies to
//! - [`collector::ErrorSource`] - the seam between the engine and its error
//!   feeds
//! - [`notifier::Notifier`] - the best-effort notification contract

pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod inference;
pub mod models;
pub mod notifier;
pub mod patterns;
pub mod prompts;
pub mod registrar;
pub mod safety;
pub mod server;
pub mod store;

pub use config::EngineConfig;
pub use engine::AnalysisEngine;
pub use error::{EngineError, Result};
