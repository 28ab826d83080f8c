use serde::Serialize;
use thiserror::Error;

use crate::{IdentityClaims, PermissionMatcher, SubjectId};

/// Where a result's effective permissions came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSource {
    /// Dynamic set from the state store (authoritative while present).
    Store,
    /// The token's embedded grant (store absent or unreachable).
    Token,
    /// Not resolved: the account is inactive.
    None,
}

/// Outcome of resolving one bearer token against the state store.
///
/// Built once per request by [`crate::AuthorizationResolver`] and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    claims: IdentityClaims,
    is_active: bool,
    should_force_logout: bool,
    effective_permissions: Vec<String>,
    permission_source: PermissionSource,
}

impl AuthResult {
    pub(crate) fn new(
        claims: IdentityClaims,
        should_force_logout: bool,
        effective_permissions: Vec<String>,
        permission_source: PermissionSource,
    ) -> Self {
        Self {
            claims,
            is_active: true,
            should_force_logout,
            effective_permissions,
            permission_source,
        }
    }

    /// Short-circuited result for a deactivated account.
    pub(crate) fn inactive(claims: IdentityClaims) -> Self {
        Self {
            claims,
            is_active: false,
            should_force_logout: false,
            effective_permissions: Vec::new(),
            permission_source: PermissionSource::None,
        }
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.claims.subject_id
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn should_force_logout(&self) -> bool {
        self.should_force_logout
    }

    pub fn effective_permissions(&self) -> &[String] {
        &self.effective_permissions
    }

    pub fn permission_source(&self) -> PermissionSource {
        self.permission_source
    }

    /// Session-level decision, before any route permission is considered.
    ///
    /// Inactivity is checked first: an inactive account is denied as such even
    /// if a forced logout is also pending.
    pub fn decision(&self) -> AccessDecision {
        if !self.is_active {
            AccessDecision::Deny(DenyReason::AccountInactive)
        } else if self.should_force_logout {
            AccessDecision::Deny(DenyReason::ForcedLogout)
        } else {
            AccessDecision::Allow
        }
    }

    pub fn into_parts(self) -> (IdentityClaims, Vec<String>) {
        (self.claims, self.effective_permissions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    AccountInactive,
    ForcedLogout,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("account is disabled")]
    AccountInactive,

    #[error("forced logout pending; re-authentication required")]
    ForcedLogout,

    #[error("forbidden: missing permission {0}")]
    Forbidden(String),
}

/// Authorize a resolved request for any one of `required`.
///
/// - No IO
/// - No panics
/// - An empty `required` list only checks the session decision
pub fn authorize<R: AsRef<str>>(
    result: &AuthResult,
    matcher: &PermissionMatcher,
    required: &[R],
) -> Result<(), AuthzError> {
    match result.decision() {
        AccessDecision::Deny(DenyReason::AccountInactive) => return Err(AuthzError::AccountInactive),
        AccessDecision::Deny(DenyReason::ForcedLogout) => return Err(AuthzError::ForcedLogout),
        AccessDecision::Allow => {}
    }

    check_permissions(matcher, result.effective_permissions(), required)
}

/// Permission half of [`authorize`], for callers that only kept the
/// effective permission list.
pub fn check_permissions<H: AsRef<str>, R: AsRef<str>>(
    matcher: &PermissionMatcher,
    held: &[H],
    required: &[R],
) -> Result<(), AuthzError> {
    if required.is_empty() || matcher.matches_any(held, required) {
        return Ok(());
    }

    let wanted: Vec<&str> = required.iter().map(AsRef::as_ref).collect();
    Err(AuthzError::Forbidden(match wanted.as_slice() {
        [single] => format!("'{single}'"),
        many => format!("one of [{}]", many.join(", ")),
    }))
}
