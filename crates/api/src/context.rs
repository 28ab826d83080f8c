use authgate_auth::{AuthResult, Role, SubjectId};
use serde::Serialize;

/// Authenticated caller attached to request extensions by the auth middleware.
///
/// `permissions` is the effective set (dynamic from the state store when
/// present, otherwise the token's own); `roles` always come from the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    user_id: SubjectId,
    username: String,
    email: String,
    roles: Vec<Role>,
    permissions: Vec<String>,
    token_id: Option<String>,
}

impl AuthContext {
    pub fn user_id(&self) -> &SubjectId {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn token_id(&self) -> Option<&str> {
        self.token_id.as_deref()
    }
}

impl From<AuthResult> for AuthContext {
    fn from(result: AuthResult) -> Self {
        let (claims, permissions) = result.into_parts();
        Self {
            user_id: claims.subject_id,
            username: claims.username,
            email: claims.email,
            roles: claims.roles.into_iter().collect(),
            permissions,
            token_id: claims.token_id,
        }
    }
}
