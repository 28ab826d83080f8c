//! Stateless identity token verification.
//!
//! Verification is local and synchronous: signature, algorithm family, issuer
//! and expiry are checked against key material fixed at construction time.
//! The verifier only ever holds public keys.

use std::path::Path;
use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::claims::{IdentityClaims, TokenClaims, TokenError};

/// Verify-only capability.
///
/// The resolver depends on this trait alone, so alternative signature schemes
/// can be substituted without touching fallback logic.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError>;
}

/// Asymmetric algorithm family accepted by a verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// RS256 / RS384 / RS512.
    Rsa,
    /// ES256 / ES384.
    Ec,
    /// EdDSA (Ed25519).
    Ed,
}

impl KeyFamily {
    fn algorithms(self) -> Vec<Algorithm> {
        match self {
            KeyFamily::Rsa => vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512],
            KeyFamily::Ec => vec![Algorithm::ES256, Algorithm::ES384],
            KeyFamily::Ed => vec![Algorithm::EdDSA],
        }
    }

    fn primary(self) -> Algorithm {
        match self {
            KeyFamily::Rsa => Algorithm::RS256,
            KeyFamily::Ec => Algorithm::ES256,
            KeyFamily::Ed => Algorithm::EdDSA,
        }
    }

    fn decoding_key(self, pem: &[u8]) -> Result<DecodingKey, KeyError> {
        let key = match self {
            KeyFamily::Rsa => DecodingKey::from_rsa_pem(pem)?,
            KeyFamily::Ec => DecodingKey::from_ec_pem(pem)?,
            KeyFamily::Ed => DecodingKey::from_ed_pem(pem)?,
        };
        Ok(key)
    }
}

impl FromStr for KeyFamily {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rsa" | "rs" | "rs256" | "rs384" | "rs512" => Ok(KeyFamily::Rsa),
            "ec" | "ecdsa" | "es" | "es256" | "es384" => Ok(KeyFamily::Ec),
            "ed" | "eddsa" | "ed25519" => Ok(KeyFamily::Ed),
            other => Err(KeyError::UnknownFamily(other.to_string())),
        }
    }
}

/// Failure to build a verifier (startup-time, never per request).
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read public key from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid public key material: {0}")]
    InvalidKey(#[from] jsonwebtoken::errors::Error),

    #[error("unknown key algorithm family '{0}' (expected rsa, ec or ed)")]
    UnknownFamily(String),

    #[error("issuer must not be empty")]
    EmptyIssuer,
}

/// JWT verifier bound to one public key, one algorithm family and one issuer.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    family: KeyFamily,
    issuer: String,
}

impl JwtVerifier {
    pub fn from_pem(
        family: KeyFamily,
        pem: &[u8],
        issuer: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let issuer = issuer.into();
        if issuer.trim().is_empty() {
            return Err(KeyError::EmptyIssuer);
        }

        let key = family.decoding_key(pem)?;

        let mut validation = Validation::new(family.primary());
        validation.algorithms = family.algorithms();
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            key,
            validation,
            family,
            issuer,
        })
    }

    pub fn from_pem_file(
        family: KeyFamily,
        path: impl AsRef<Path>,
        issuer: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|source| KeyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pem(family, &pem, issuer)
    }

    /// Clock skew tolerated on `exp`, in seconds.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.validation.leeway = leeway_secs;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }
}

impl core::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("family", &self.family)
            .field("issuer", &self.issuer)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(classify)?;

        // jsonwebtoken already compared `iss`; keep the exact-match rule local too.
        if data.claims.iss != self.issuer {
            return Err(TokenError::WrongIssuer);
        }

        IdentityClaims::try_from(data.claims)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_) => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
        _ => TokenError::Malformed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use jsonwebtoken::{EncodingKey, Header};

    const PRIVATE_KEY: &str = include_str!("../testdata/rsa_private.pem");
    const PUBLIC_KEY: &str = include_str!("../testdata/rsa_public.pem");
    const OTHER_PRIVATE_KEY: &str = include_str!("../testdata/other_rsa_private.pem");
    const ISSUER: &str = "auth-service";

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn claims(iss: &str, iat: i64, exp: i64) -> TokenClaims {
        TokenClaims {
            user_id: "user-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            roles: vec!["admin".to_string()],
            permissions: vec!["cdn:zones:read".to_string()],
            token_type: Some("access".to_string()),
            jti: Some("tok-1".to_string()),
            iss: iss.to_string(),
            iat,
            exp,
        }
    }

    fn sign_with(alg: Algorithm, private_pem: &str, claims: &TokenClaims) -> String {
        jsonwebtoken::encode(
            &Header::new(alg),
            claims,
            &EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap(),
        )
        .unwrap()
    }

    fn sign(claims: &TokenClaims) -> String {
        sign_with(Algorithm::RS256, PRIVATE_KEY, claims)
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier::from_pem(KeyFamily::Rsa, PUBLIC_KEY.as_bytes(), ISSUER).unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let t = now();
        let token = sign(&claims(ISSUER, t, t + 600));

        let identity = verifier().verify(&token).unwrap();
        assert_eq!(identity.subject_id.as_str(), "user-1");
        assert_eq!(identity.issuer, ISSUER);
        assert_eq!(identity.issued_at.timestamp(), t);
        assert_eq!(identity.token_permissions, vec!["cdn:zones:read".to_string()]);
    }

    #[test]
    fn accepts_other_algorithms_of_the_same_family() {
        let t = now();
        let token = sign_with(Algorithm::RS512, PRIVATE_KEY, &claims(ISSUER, t, t + 600));
        assert!(verifier().verify(&token).is_ok());
    }

    #[test]
    fn rejects_token_signed_by_another_key() {
        let t = now();
        let token = sign_with(Algorithm::RS256, OTHER_PRIVATE_KEY, &claims(ISSUER, t, t + 600));
        assert_eq!(verifier().verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn rejects_tampered_payload() {
        let t = now();
        let token = sign(&claims(ISSUER, t, t + 600));
        let forged = sign(&TokenClaims {
            user_id: "someone-else".to_string(),
            ..claims(ISSUER, t, t + 600)
        });

        // Genuine header + signature, forged payload.
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        assert_eq!(verifier().verify(&spliced), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn rejects_symmetric_algorithm_substitution() {
        let t = now();
        // An HMAC token keyed with the public key bytes: the classic substitution attack.
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims(ISSUER, t, t + 600),
            &EncodingKey::from_secret(PUBLIC_KEY.as_bytes()),
        )
        .unwrap();

        assert_eq!(verifier().verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn rejects_expired_token() {
        let t = now();
        let token = sign(&claims(ISSUER, t - 7200, t - 3600));
        assert_eq!(verifier().verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn leeway_tolerates_recent_expiry() {
        let t = now();
        let token = sign(&claims(ISSUER, t - 600, t - 5));
        assert_eq!(verifier().verify(&token), Err(TokenError::Expired));
        assert!(verifier().with_leeway(60).verify(&token).is_ok());
    }

    #[test]
    fn rejects_wrong_issuer() {
        let t = now();
        let token = sign(&claims("someone-else", t, t + 600));
        assert_eq!(verifier().verify(&token), Err(TokenError::WrongIssuer));
    }

    #[test]
    fn issuer_match_is_exact() {
        let t = now();
        let token = sign(&claims("auth-service ", t, t + 600));
        assert_eq!(verifier().verify(&token), Err(TokenError::WrongIssuer));
    }

    #[test]
    fn rejects_garbage_as_malformed() {
        assert!(matches!(
            verifier().verify("not-a-token"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_identity_claims_as_malformed() {
        let t = now();
        let payload = serde_json::json!({
            "user_id": "user-1",
            "iss": ISSUER,
            "iat": t,
            "exp": t + 600,
        });
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &payload,
            &EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            verifier().verify(&token),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn construction_rejects_bad_inputs() {
        assert!(matches!(
            JwtVerifier::from_pem(KeyFamily::Rsa, PUBLIC_KEY.as_bytes(), ""),
            Err(KeyError::EmptyIssuer)
        ));
        assert!(matches!(
            JwtVerifier::from_pem(KeyFamily::Rsa, b"not a pem", ISSUER),
            Err(KeyError::InvalidKey(_))
        ));
        assert!(matches!(
            JwtVerifier::from_pem_file(KeyFamily::Rsa, "/nonexistent/key.pem", ISSUER),
            Err(KeyError::Io { .. })
        ));
    }

    #[test]
    fn key_family_parses_common_names() {
        assert_eq!("RSA".parse::<KeyFamily>().unwrap(), KeyFamily::Rsa);
        assert_eq!("ecdsa".parse::<KeyFamily>().unwrap(), KeyFamily::Ec);
        assert_eq!("ed25519".parse::<KeyFamily>().unwrap(), KeyFamily::Ed);
        assert!("hmac".parse::<KeyFamily>().is_err());
    }
}
