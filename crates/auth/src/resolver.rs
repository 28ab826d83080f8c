//! Authorization resolution: token verification plus state-store reconciliation.
//!
//! Only token verification can fail a resolution. Every state-store problem is
//! absorbed into a fixed default:
//!
//! | fact                | absent / unavailable / undecodable |
//! |---------------------|------------------------------------|
//! | account status      | active                             |
//! | force-logout marker | no forced logout                   |
//! | dynamic permissions | the token's embedded permissions   |
//!
//! Each default is logged and counted per fact and per cause, so a store that
//! keeps failing is visible even though requests keep flowing.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::authorize::{AuthResult, PermissionSource};
use crate::claims::{IdentityClaims, TokenError};
use crate::store::{AccountStatus, DynamicPermissionSet, StateReader, StoreError, StoreOutcome};
use crate::verifier::TokenVerifier;
use crate::SubjectId;

/// Default per-read budget; the store is expected to sit next to the service.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound for each individual store read.
    pub store_timeout: Duration,

    /// Issue the three reads together instead of one after another.
    ///
    /// Sequential mode skips the marker and permission reads for inactive
    /// accounts; both modes yield identical results.
    pub concurrent_reads: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            concurrent_reads: true,
        }
    }
}

/// One of the mutable facts looked up per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fact {
    AccountStatus,
    ForceLogout,
    DynamicPermissions,
}

impl Fact {
    pub fn as_str(self) -> &'static str {
        match self {
            Fact::AccountStatus => "account_status",
            Fact::ForceLogout => "force_logout",
            Fact::DynamicPermissions => "dynamic_permissions",
        }
    }

    fn default_applied(self) -> &'static str {
        match self {
            Fact::AccountStatus => "active",
            Fact::ForceLogout => "no_forced_logout",
            Fact::DynamicPermissions => "token_permissions",
        }
    }
}

#[derive(Debug, Default)]
struct FactCounters {
    absent: AtomicU64,
    unavailable: AtomicU64,
    undecodable: AtomicU64,
}

impl FactCounters {
    fn snapshot(&self) -> FactSnapshot {
        FactSnapshot {
            absent: self.absent.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct FallbackStats {
    account_status: FactCounters,
    force_logout: FactCounters,
    dynamic_permissions: FactCounters,
}

impl FallbackStats {
    fn counters(&self, fact: Fact) -> &FactCounters {
        match fact {
            Fact::AccountStatus => &self.account_status,
            Fact::ForceLogout => &self.force_logout,
            Fact::DynamicPermissions => &self.dynamic_permissions,
        }
    }

    fn record_absent(&self, fact: Fact) {
        self.counters(fact).absent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, fact: Fact, err: &StoreError) {
        let counters = self.counters(fact);
        let counter = if err.is_unavailable() {
            &counters.unavailable
        } else {
            &counters.undecodable
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of fallback counters for one fact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FactSnapshot {
    /// Key not present: the store answered "nothing here".
    pub absent: u64,
    /// Store unreachable or timed out: it could not answer.
    pub unavailable: u64,
    /// Value present but not decodable.
    pub undecodable: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FallbackSnapshot {
    pub account_status: FactSnapshot,
    pub force_logout: FactSnapshot,
    pub dynamic_permissions: FactSnapshot,
}

impl FallbackSnapshot {
    pub fn fact(&self, fact: Fact) -> FactSnapshot {
        match fact {
            Fact::AccountStatus => self.account_status,
            Fact::ForceLogout => self.force_logout,
            Fact::DynamicPermissions => self.dynamic_permissions,
        }
    }
}

/// Resolves bearer tokens into [`AuthResult`]s.
///
/// Cheap to share behind an `Arc`; holds no per-request state.
pub struct AuthorizationResolver {
    verifier: Arc<dyn TokenVerifier>,
    store: Arc<dyn StateReader>,
    config: ResolverConfig,
    stats: FallbackStats,
}

impl AuthorizationResolver {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        store: Arc<dyn StateReader>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            verifier,
            store,
            config,
            stats: FallbackStats::default(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Counters of every default applied so far.
    pub fn fallback_stats(&self) -> FallbackSnapshot {
        FallbackSnapshot {
            account_status: self.stats.account_status.snapshot(),
            force_logout: self.stats.force_logout.snapshot(),
            dynamic_permissions: self.stats.dynamic_permissions.snapshot(),
        }
    }

    /// Resolve a raw bearer token (scheme prefix already stripped).
    ///
    /// Fails only when the token itself is invalid. Dropping the returned
    /// future abandons any in-flight store reads; resolution never writes.
    #[instrument(skip_all, fields(subject_id = tracing::field::Empty))]
    pub async fn resolve(&self, token: &str) -> Result<AuthResult, TokenError> {
        let claims = self.verifier.verify(token)?;
        tracing::Span::current().record("subject_id", claims.subject_id.as_str());

        let result = if self.config.concurrent_reads {
            self.resolve_concurrently(claims).await
        } else {
            self.resolve_sequentially(claims).await
        };

        debug!(
            is_active = result.is_active(),
            should_force_logout = result.should_force_logout(),
            permission_source = ?result.permission_source(),
            permission_count = result.effective_permissions().len(),
            "authorization resolved"
        );
        Ok(result)
    }

    async fn resolve_concurrently(&self, claims: IdentityClaims) -> AuthResult {
        let subject = &claims.subject_id;
        let (status, marker, permissions) = tokio::join!(
            self.bounded(self.store.account_status(subject)),
            self.bounded(self.store.force_logout_marker(subject)),
            self.bounded(self.store.dynamic_permissions(subject)),
        );

        if !self.account_active(subject, status) {
            return AuthResult::inactive(claims);
        }
        self.assemble(claims, marker, permissions)
    }

    async fn resolve_sequentially(&self, claims: IdentityClaims) -> AuthResult {
        let subject = &claims.subject_id;

        let status = self.bounded(self.store.account_status(subject)).await;
        if !self.account_active(subject, status) {
            return AuthResult::inactive(claims);
        }

        let marker = self.bounded(self.store.force_logout_marker(subject)).await;
        let permissions = self.bounded(self.store.dynamic_permissions(subject)).await;
        self.assemble(claims, marker, permissions)
    }

    fn assemble(
        &self,
        claims: IdentityClaims,
        marker: StoreOutcome<DateTime<Utc>>,
        permissions: StoreOutcome<DynamicPermissionSet>,
    ) -> AuthResult {
        let subject = &claims.subject_id;

        let should_force_logout = self
            .fall_back(Fact::ForceLogout, subject, marker)
            // Whole seconds, strictly after issuance.
            .is_some_and(|marker| marker.timestamp() > claims.issued_at.timestamp());

        let (effective, source) = match self.fall_back(Fact::DynamicPermissions, subject, permissions)
        {
            Some(set) => (set.permissions, PermissionSource::Store),
            None => (claims.token_permissions.clone(), PermissionSource::Token),
        };

        AuthResult::new(claims, should_force_logout, effective, source)
    }

    fn account_active(&self, subject: &SubjectId, status: StoreOutcome<AccountStatus>) -> bool {
        self.fall_back(Fact::AccountStatus, subject, status)
            .is_none_or(|status| status.is_active)
    }

    async fn bounded<T, F>(&self, read: F) -> StoreOutcome<T>
    where
        F: Future<Output = StoreOutcome<T>>,
    {
        match tokio::time::timeout(self.config.store_timeout, read).await {
            Ok(outcome) => outcome,
            Err(_) => StoreOutcome::Failed(StoreError::TimedOut(self.config.store_timeout)),
        }
    }

    /// Unwrap a present value, or record and log why the default applies.
    fn fall_back<T>(&self, fact: Fact, subject: &SubjectId, outcome: StoreOutcome<T>) -> Option<T> {
        match outcome {
            StoreOutcome::Present(value) => Some(value),
            StoreOutcome::Absent => {
                self.stats.record_absent(fact);
                debug!(
                    fact = fact.as_str(),
                    subject_id = %subject,
                    outcome = "absent",
                    default = fact.default_applied(),
                    "no cached entry, applying default"
                );
                None
            }
            StoreOutcome::Failed(err) => {
                self.stats.record_failure(fact, &err);
                warn!(
                    fact = fact.as_str(),
                    subject_id = %subject,
                    outcome = err.kind(),
                    default = fact.default_applied(),
                    error = %err,
                    "state store lookup failed, applying default"
                );
                None
            }
        }
    }
}

impl core::fmt::Debug for AuthorizationResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthorizationResolver")
            .field("config", &self.config)
            .field("fallbacks", &self.fallback_stats())
            .finish_non_exhaustive()
    }
}
