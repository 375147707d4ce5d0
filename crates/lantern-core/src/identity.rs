//! Operator identity forwarded by the edge authenticator.
//!
//! The edge proxy terminates SSO and injects `X-Authentik-*` headers on every
//! request it forwards. Nothing downstream re-verifies the session; the
//! headers are the identity. A request without them is unauthenticated (401),
//! a request whose groups grant no support tier is forbidden (403).

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Group granting read-only diagnostic access.
pub const GROUP_DIAG: &str = "wopr-support-diag";
/// Group granting pre-approved remediation access.
pub const GROUP_REMEDIATE: &str = "wopr-support-remediate";
/// Group granting time-boxed unrestricted access.
pub const GROUP_BREAKGLASS: &str = "wopr-support-breakglass";

/// Support access tier. Ordering is privilege ordering: a higher tier
/// inherits everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    /// Read-only diagnostics.
    Diag,
    /// Pre-approved remediation actions.
    Remediate,
    /// Unrestricted, time-boxed emergency access.
    Breakglass,
}

impl AccessTier {
    /// Stable wire name of the tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Diag => "diag",
            AccessTier::Remediate => "remediate",
            AccessTier::Breakglass => "breakglass",
        }
    }

    /// Parse a wire name back into a tier.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "diag" => Some(AccessTier::Diag),
            "remediate" => Some(AccessTier::Remediate),
            "breakglass" => Some(AccessTier::Breakglass),
            _ => None,
        }
    }

    /// The group that grants this tier.
    #[must_use]
    pub fn group(&self) -> &'static str {
        match self {
            AccessTier::Diag => GROUP_DIAG,
            AccessTier::Remediate => GROUP_REMEDIATE,
            AccessTier::Breakglass => GROUP_BREAKGLASS,
        }
    }
}

impl std::fmt::Display for AccessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication / authorization failure.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The forwarded identity headers were absent.
    #[error("Missing authentication headers")]
    MissingHeaders,

    /// The user carries no support-plane group at all.
    #[error("No support-plane access tier assigned")]
    NoTier,

    /// The user's tier is below the endpoint's minimum.
    #[error("Requires {0} tier or higher")]
    InsufficientTier(AccessTier),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingHeaders => StatusCode::UNAUTHORIZED,
            AuthError::NoTier | AuthError::InsufficientTier(_) => StatusCode::FORBIDDEN,
        }
    }
}

/// Error body shared by the gateway and the CA.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthErrorBody {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
        });
        (status, body).into_response()
    }
}

/// An authenticated support operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportUser {
    pub uid: String,
    pub username: String,
    pub email: String,
    pub groups: Vec<String>,
}

impl SupportUser {
    /// Build a user from forwarded identity headers.
    ///
    /// # Errors
    ///
    /// `MissingHeaders` when the UID header is absent, `NoTier` when the
    /// group list grants no support tier.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };

        let uid = header("X-Authentik-UID");
        if uid.is_empty() {
            return Err(AuthError::MissingHeaders);
        }

        let groups: Vec<String> = header("X-Authentik-Groups")
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect();

        let user = SupportUser {
            uid,
            username: header("X-Authentik-Username"),
            email: header("X-Authentik-Email"),
            groups,
        };

        if user.access_tier().is_none() {
            return Err(AuthError::NoTier);
        }
        Ok(user)
    }

    /// Highest access tier the user holds, if any.
    #[must_use]
    pub fn access_tier(&self) -> Option<AccessTier> {
        let has = |g: &str| self.groups.iter().any(|m| m == g);
        if has(GROUP_BREAKGLASS) {
            Some(AccessTier::Breakglass)
        } else if has(GROUP_REMEDIATE) {
            Some(AccessTier::Remediate)
        } else if has(GROUP_DIAG) {
            Some(AccessTier::Diag)
        } else {
            None
        }
    }

    /// Whether the user meets a minimum tier. Higher tiers inherit lower
    /// privileges.
    #[must_use]
    pub fn has_tier(&self, minimum: AccessTier) -> bool {
        self.access_tier().is_some_and(|t| t >= minimum)
    }

    /// Enforce a minimum tier, for use at the top of a handler.
    ///
    /// # Errors
    ///
    /// `InsufficientTier` when the user's tier is below `minimum`.
    pub fn require(&self, minimum: AccessTier) -> Result<(), AuthError> {
        if self.has_tier(minimum) {
            Ok(())
        } else {
            Err(AuthError::InsufficientTier(minimum))
        }
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for SupportUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        SupportUser::from_headers(&parts.headers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(uid: &str, groups: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        if !uid.is_empty() {
            h.insert("X-Authentik-UID", HeaderValue::from_str(uid).unwrap());
        }
        h.insert("X-Authentik-Username", HeaderValue::from_static("op"));
        h.insert(
            "X-Authentik-Email",
            HeaderValue::from_static("op@example.com"),
        );
        h.insert("X-Authentik-Groups", HeaderValue::from_str(groups).unwrap());
        h
    }

    #[test]
    fn test_tier_ordering_is_privilege_ordering() {
        assert!(AccessTier::Breakglass > AccessTier::Remediate);
        assert!(AccessTier::Remediate > AccessTier::Diag);
    }

    #[test]
    fn test_missing_uid_is_unauthorized() {
        let err = SupportUser::from_headers(&headers("", GROUP_DIAG)).unwrap_err();
        assert!(matches!(err, AuthError::MissingHeaders));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_no_support_group_is_forbidden() {
        let err = SupportUser::from_headers(&headers("u1", "staff,billing")).unwrap_err();
        assert!(matches!(err, AuthError::NoTier));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_highest_tier_wins() {
        let user = SupportUser::from_headers(&headers(
            "u1",
            &format!("{GROUP_DIAG}, {GROUP_BREAKGLASS}"),
        ))
        .unwrap();
        assert_eq!(user.access_tier(), Some(AccessTier::Breakglass));
    }

    #[test]
    fn test_groups_are_trimmed() {
        let user =
            SupportUser::from_headers(&headers("u1", &format!("  {GROUP_REMEDIATE} , other ")))
                .unwrap();
        assert_eq!(user.access_tier(), Some(AccessTier::Remediate));
    }

    #[test]
    fn test_higher_tier_inherits_lower() {
        let user = SupportUser::from_headers(&headers("u1", GROUP_BREAKGLASS)).unwrap();
        assert!(user.has_tier(AccessTier::Diag));
        assert!(user.has_tier(AccessTier::Remediate));
        assert!(user.require(AccessTier::Breakglass).is_ok());
    }

    #[test]
    fn test_lower_tier_rejected_for_higher() {
        let user = SupportUser::from_headers(&headers("u1", GROUP_DIAG)).unwrap();
        let err = user.require(AccessTier::Remediate).unwrap_err();
        assert!(matches!(
            err,
            AuthError::InsufficientTier(AccessTier::Remediate)
        ));
    }

    #[test]
    fn test_tier_wire_names_round_trip() {
        for tier in [
            AccessTier::Diag,
            AccessTier::Remediate,
            AccessTier::Breakglass,
        ] {
            assert_eq!(AccessTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(AccessTier::parse("root"), None);
    }
}
