//! Dynamic authorization resolution, independent of any transport.
//!
//! Verifies identity tokens locally and reconciles their embedded grants with
//! the mutable facts kept in a fast state store. This crate knows nothing about
//! HTTP; concrete store backends live in `authgate-infra`.

pub mod authorize;
pub mod claims;
pub mod identity;
pub mod permissions;
pub mod resolver;
pub mod store;
pub mod verifier;

pub use authorize::{
    AccessDecision, AuthResult, AuthzError, DenyReason, PermissionSource, authorize,
    check_permissions,
};
pub use claims::{IdentityClaims, TokenClaims, TokenError};
pub use identity::{Role, SubjectId};
pub use permissions::{
    DEFAULT_SUPERUSER_NAMESPACES, Permission, PermissionMatcher, matches, matches_any,
};
pub use resolver::{
    AuthorizationResolver, DEFAULT_STORE_TIMEOUT, Fact, FactSnapshot, FallbackSnapshot,
    ResolverConfig,
};
pub use store::{
    AccountStatus, DynamicPermissionSet, KeyValueBackend, StateReader, StateWriter, StoreError,
    StoreOutcome,
};
pub use verifier::{JwtVerifier, KeyError, KeyFamily, TokenVerifier};
