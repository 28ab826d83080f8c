//! Typed access to the mutable per-subject facts kept in the state store.
//!
//! Three facts are read on every resolution:
//! - account status (`user:status:{id}`)
//! - force-logout marker (`user:force_logout:{id}`)
//! - dynamic permission set (`user:dynamic_permissions:{id}`)
//!
//! Reads never fail with an error value. They return a [`StoreOutcome`] that
//! keeps "key absent", "store could not answer" and "value undecodable" apart,
//! because callers default the same way but operators must be able to tell
//! them apart.
//!
//! Backends only implement [`KeyValueBackend`] (raw GET / SET with expiry);
//! the typed [`StateReader`] / [`StateWriter`] capabilities come for free.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SubjectId;

pub mod codec;

pub use codec::{
    FORCE_LOGOUT_TTL, PERMISSIONS_TTL, STATUS_TTL, dynamic_permissions_key, force_logout_key,
    status_key,
};

/// Cached account state, keyed by subject id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub is_active: bool,

    /// Missing in values written by older populating services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Permission set that overrides the token's embedded grant while present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicPermissionSet {
    pub permissions: Vec<String>,

    /// Written by the populating service; not required to read the set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("state store did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("undecodable value at '{key}': {reason}")]
    Decode { key: String, reason: String },

    #[error("failed to encode value for '{key}': {reason}")]
    Encode { key: String, reason: String },
}

impl StoreError {
    /// The store could not answer at all (as opposed to answering garbage).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::TimedOut(_))
    }

    /// Stable label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "unavailable",
            StoreError::TimedOut(_) => "timeout",
            StoreError::Decode { .. } => "undecodable",
            StoreError::Encode { .. } => "unencodable",
        }
    }
}

/// Result of a single state-store read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome<T> {
    Present(T),
    Absent,
    Failed(StoreError),
}

impl<T> StoreOutcome<T> {
    /// Lift a raw backend read through a decoder.
    pub fn from_raw<F>(raw: Result<Option<String>, StoreError>, decode: F) -> Self
    where
        F: FnOnce(&str) -> Result<T, StoreError>,
    {
        match raw {
            Ok(Some(value)) => match decode(&value) {
                Ok(decoded) => StoreOutcome::Present(decoded),
                Err(err) => StoreOutcome::Failed(err),
            },
            Ok(None) => StoreOutcome::Absent,
            Err(err) => StoreOutcome::Failed(err),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StoreOutcome<U> {
        match self {
            StoreOutcome::Present(value) => StoreOutcome::Present(f(value)),
            StoreOutcome::Absent => StoreOutcome::Absent,
            StoreOutcome::Failed(err) => StoreOutcome::Failed(err),
        }
    }

    pub fn present(self) -> Option<T> {
        match self {
            StoreOutcome::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, StoreOutcome::Absent)
    }
}

/// Raw key-value transport under the typed store API.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// `Ok(None)` means the key does not exist (or has expired).
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration)
    -> Result<(), StoreError>;
}

/// Read-only capability used by the resolver.
#[async_trait]
pub trait StateReader: Send + Sync {
    async fn account_status(&self, subject: &SubjectId) -> StoreOutcome<AccountStatus>;

    async fn force_logout_marker(&self, subject: &SubjectId) -> StoreOutcome<DateTime<Utc>>;

    async fn dynamic_permissions(&self, subject: &SubjectId)
    -> StoreOutcome<DynamicPermissionSet>;
}

/// Administrative write capability (never used during resolution).
#[async_trait]
pub trait StateWriter: Send + Sync {
    /// Record the account state with a 10-minute freshness window.
    async fn set_account_status(&self, subject: &SubjectId, is_active: bool)
    -> Result<(), StoreError>;

    /// Invalidate every token issued before now, for 24 hours.
    async fn set_force_logout_marker(&self, subject: &SubjectId) -> Result<(), StoreError>;
}

#[async_trait]
impl<B: KeyValueBackend> StateReader for B {
    async fn account_status(&self, subject: &SubjectId) -> StoreOutcome<AccountStatus> {
        let key = status_key(subject);
        let raw = self.get(&key).await;
        StoreOutcome::from_raw(raw, |value| codec::decode_status(&key, value))
    }

    async fn force_logout_marker(&self, subject: &SubjectId) -> StoreOutcome<DateTime<Utc>> {
        let key = force_logout_key(subject);
        let raw = self.get(&key).await;
        StoreOutcome::from_raw(raw, |value| codec::decode_force_logout(&key, value))
    }

    async fn dynamic_permissions(
        &self,
        subject: &SubjectId,
    ) -> StoreOutcome<DynamicPermissionSet> {
        let key = dynamic_permissions_key(subject);
        let raw = self.get(&key).await;
        StoreOutcome::from_raw(raw, |value| codec::decode_permissions(&key, value))
    }
}

#[async_trait]
impl<B: KeyValueBackend> StateWriter for B {
    async fn set_account_status(
        &self,
        subject: &SubjectId,
        is_active: bool,
    ) -> Result<(), StoreError> {
        let key = status_key(subject);
        let status = AccountStatus {
            is_active,
            updated_at: Some(Utc::now()),
        };
        let value = codec::encode_status(&key, &status)?;
        self.set_with_expiry(&key, value, STATUS_TTL).await
    }

    async fn set_force_logout_marker(&self, subject: &SubjectId) -> Result<(), StoreError> {
        let key = force_logout_key(subject);
        let value = codec::encode_force_logout(Utc::now());
        self.set_with_expiry(&key, value, FORCE_LOGOUT_TTL).await
    }
}
