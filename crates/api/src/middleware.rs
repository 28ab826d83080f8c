use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, info};

use authgate_auth::{
    AccessDecision, AuthResult, AuthorizationResolver, AuthzError, DenyReason, PermissionMatcher,
    check_permissions,
};

use crate::app::errors::{self, request_id};
use crate::context::AuthContext;

/// Longest token prefix that may appear in logs.
const LOGGED_TOKEN_PREFIX: usize = 20;

#[derive(Clone)]
pub struct AuthState {
    pub resolver: Arc<AuthorizationResolver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerError {
    Missing,
    WrongScheme,
}

impl BearerError {
    pub fn message(self) -> &'static str {
        match self {
            BearerError::Missing => "Missing authorization header",
            BearerError::WrongScheme => "Invalid authorization header format",
        }
    }
}

/// Authenticate every request: resolve the bearer token, reject inactive or
/// force-logged-out sessions and attach an [`AuthContext`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let rid = request_id(req.headers()).map(str::to_owned);
    let rid = rid.as_deref();

    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(err) => return errors::unauthorized(err.message(), rid),
    };

    let result = match state.resolver.resolve(token).await {
        Ok(result) => result,
        Err(err) => {
            debug!(
                error = %err,
                token_prefix = %token_prefix(token),
                "token validation failed"
            );
            return errors::unauthorized("Invalid or expired token", rid);
        }
    };

    match result.decision() {
        AccessDecision::Deny(DenyReason::AccountInactive) => {
            return errors::forbidden("User account is disabled", rid);
        }
        AccessDecision::Deny(DenyReason::ForcedLogout) => {
            return errors::unauthorized("Please login again", rid);
        }
        AccessDecision::Allow => {}
    }

    let context = attach(result);
    debug!(
        user_id = %context.user_id(),
        username = context.username(),
        permission_count = context.permissions().len(),
        "user authenticated"
    );
    req.extensions_mut().insert(context);

    next.run(req).await
}

/// Like [`auth_middleware`], but never rejects: the context is attached only
/// for tokens that resolve to an active, non-revoked session.
pub async fn optional_auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let resolved = match extract_bearer(req.headers()) {
        Ok(token) => state.resolver.resolve(token).await.ok(),
        Err(_) => None,
    };

    if let Some(result) = resolved.filter(|r| r.decision() == AccessDecision::Allow) {
        req.extensions_mut().insert(attach(result));
    }

    next.run(req).await
}

fn attach(result: AuthResult) -> AuthContext {
    tracing::Span::current().record("subject_id", result.subject_id().as_str());
    AuthContext::from(result)
}

/// Route requirement checked against the caller's effective permissions.
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    matcher: Arc<PermissionMatcher>,
    required: Arc<[String]>,
}

impl PermissionGuard {
    pub fn require(matcher: Arc<PermissionMatcher>, permission: impl Into<String>) -> Self {
        Self {
            matcher,
            required: Arc::from(vec![permission.into()]),
        }
    }

    /// Satisfied by any one of `permissions`.
    pub fn require_any<I, S>(matcher: Arc<PermissionMatcher>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            matcher,
            required: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }
}

/// Must run after [`auth_middleware`] (or [`optional_auth_middleware`]).
pub async fn permission_guard(
    State(guard): State<PermissionGuard>,
    req: Request,
    next: Next,
) -> Response {
    let rid = request_id(req.headers());

    let Some(context) = req.extensions().get::<AuthContext>() else {
        return errors::forbidden("No permissions found", rid);
    };

    if let Err(AuthzError::Forbidden(missing)) =
        check_permissions(&guard.matcher, context.permissions(), &guard.required[..])
    {
        info!(
            user_id = %context.user_id(),
            required = ?guard.required,
            held = ?context.permissions(),
            "permission denied"
        );
        let message = format!("Insufficient permissions: required {missing}");
        return errors::forbidden(&message, rid);
    }

    next.run(req).await
}

pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, BearerError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(BearerError::Missing)?;

    let header = header.to_str().map_err(|_| BearerError::WrongScheme)?;
    if header.is_empty() {
        return Err(BearerError::Missing);
    }

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(BearerError::WrongScheme)?
        .trim();
    if token.is_empty() {
        return Err(BearerError::WrongScheme);
    }

    Ok(token)
}

fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(LOGGED_TOKEN_PREFIX) {
        Some((end, _)) => &token[..end],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Err(BearerError::Missing));
        assert_eq!(extract_bearer(&headers("")), Err(BearerError::Missing));
        assert_eq!(extract_bearer(&headers("Basic abc")), Err(BearerError::WrongScheme));
        assert_eq!(extract_bearer(&headers("bearer abc")), Err(BearerError::WrongScheme));
        assert_eq!(extract_bearer(&headers("Bearer ")), Err(BearerError::WrongScheme));
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Ok("abc.def"));
    }

    #[test]
    fn logged_token_prefix_is_bounded() {
        assert_eq!(token_prefix("short"), "short");
        assert_eq!(token_prefix("abcdefghijklmnopqrstuvwxyz"), "abcdefghijklmnopqrst");
    }

    #[test]
    fn guard_requirements() {
        let matcher = Arc::new(PermissionMatcher::new());
        let guard = PermissionGuard::require_any(matcher.clone(), ["a:b:c", "d:e:f"]);
        assert_eq!(guard.required(), ["a:b:c".to_string(), "d:e:f".to_string()]);
        assert_eq!(PermissionGuard::require(matcher, "x:y:z").required().len(), 1);
    }
}
