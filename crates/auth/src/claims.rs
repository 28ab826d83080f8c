use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Role, SubjectId};

/// Identity token payload as it appears on the wire.
///
/// Field names are fixed by the issuing service; `jti` and `token_type` are the
/// only optional claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verified identity claims.
///
/// Only ever produced by a [`crate::TokenVerifier`]; callers read it, they do
/// not build it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaims {
    /// Subject / principal identifier (`user_id` on the wire).
    pub subject_id: SubjectId,

    pub username: String,
    pub email: String,
    pub roles: BTreeSet<Role>,

    /// Permissions embedded at issuance time, in issuance order.
    pub token_permissions: Vec<String>,

    /// Unique token identifier (`jti`), when the issuer sets one.
    pub token_id: Option<String>,

    pub token_type: Option<String>,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("invalid token issuer")]
    WrongIssuer,

    #[error("malformed token: {0}")]
    Malformed(String),
}

impl TryFrom<TokenClaims> for IdentityClaims {
    type Error = TokenError;

    fn try_from(wire: TokenClaims) -> Result<Self, Self::Error> {
        let subject_id = SubjectId::new(wire.user_id);
        if subject_id.is_blank() {
            return Err(TokenError::Malformed("empty user_id claim".to_string()));
        }

        let claims = Self {
            subject_id,
            username: wire.username,
            email: wire.email,
            roles: wire.roles.into_iter().map(Role::new).collect(),
            token_permissions: wire.permissions,
            token_id: wire.jti.filter(|id| !id.is_empty()),
            token_type: wire.token_type,
            issuer: wire.iss,
            issued_at: timestamp("iat", wire.iat)?,
            expires_at: timestamp("exp", wire.exp)?,
        };

        validate_time_window(&claims)?;
        Ok(claims)
    }
}

/// Reject claims whose validity window is empty or inverted.
///
/// Expiry against the current time is checked during signature verification;
/// this only guards against tokens that could never have been valid.
pub fn validate_time_window(claims: &IdentityClaims) -> Result<(), TokenError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenError::Malformed(
            "invalid token time window (exp <= iat)".to_string(),
        ));
    }
    Ok(())
}

fn timestamp(claim: &str, secs: i64) -> Result<DateTime<Utc>, TokenError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TokenError::Malformed(format!("'{claim}' is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire() -> TokenClaims {
        TokenClaims {
            user_id: "user-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            roles: vec!["viewer".to_string(), "editor".to_string(), "viewer".to_string()],
            permissions: vec!["cdn:zones:read".to_string(), "dns:records:write".to_string()],
            token_type: Some("access".to_string()),
            jti: Some("tok-1".to_string()),
            iss: "auth-service".to_string(),
            iat: 100,
            exp: 200,
        }
    }

    #[test]
    fn converts_wire_claims() {
        let claims = IdentityClaims::try_from(wire()).unwrap();

        assert_eq!(claims.subject_id.as_str(), "user-1");
        assert_eq!(claims.roles.len(), 2);
        assert!(claims.roles.contains(&Role::new("editor")));
        assert_eq!(
            claims.token_permissions,
            vec!["cdn:zones:read".to_string(), "dns:records:write".to_string()]
        );
        assert_eq!(claims.token_id.as_deref(), Some("tok-1"));
        assert_eq!(claims.issued_at.timestamp(), 100);
        assert_eq!(claims.expires_at.timestamp(), 200);
    }

    #[test]
    fn empty_user_id_is_malformed() {
        let mut w = wire();
        w.user_id = " ".to_string();
        assert!(matches!(
            IdentityClaims::try_from(w),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn inverted_time_window_is_malformed() {
        let mut w = wire();
        w.exp = w.iat;
        assert!(matches!(
            IdentityClaims::try_from(w),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn empty_jti_is_treated_as_missing() {
        let mut w = wire();
        w.jti = Some(String::new());
        let claims = IdentityClaims::try_from(w).unwrap();
        assert_eq!(claims.token_id, None);
    }

    #[test]
    fn required_wire_claims_are_enforced() {
        let json = r#"{"user_id":"u","username":"a","email":"e","roles":[],"iss":"i","iat":1,"exp":2}"#;
        assert!(serde_json::from_str::<TokenClaims>(json).is_err());
    }
}
