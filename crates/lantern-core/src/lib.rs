//! Shared identity and access-tier model for the Lantern fleet remediation
//! plane.
//!
//! The support gateway and the SSH certificate authority both authenticate
//! operators through identity headers forwarded by the edge proxy. This crate
//! holds the single definition of that identity: the three-tier access model,
//! the group constants the tiers map to, and an axum extractor that rejects
//! requests with missing or insufficient credentials.

pub mod identity;

pub use identity::{
    AccessTier, AuthError, SupportUser, GROUP_BREAKGLASS, GROUP_DIAG, GROUP_REMEDIATE,
};
