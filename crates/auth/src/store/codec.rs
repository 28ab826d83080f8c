//! Key layout and value encoding shared by every backend.
//!
//! The layout is a compatibility contract with the services that populate the
//! store; do not change key patterns or value shapes.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{AccountStatus, DynamicPermissionSet, StoreError};
use crate::SubjectId;

pub const STATUS_TTL: Duration = Duration::from_secs(10 * 60);
pub const PERMISSIONS_TTL: Duration = Duration::from_secs(15 * 60);
pub const FORCE_LOGOUT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn status_key(subject: &SubjectId) -> String {
    format!("user:status:{subject}")
}

pub fn dynamic_permissions_key(subject: &SubjectId) -> String {
    format!("user:dynamic_permissions:{subject}")
}

pub fn force_logout_key(subject: &SubjectId) -> String {
    format!("user:force_logout:{subject}")
}

pub fn decode_status(key: &str, raw: &str) -> Result<AccountStatus, StoreError> {
    serde_json::from_str(raw).map_err(|e| decode_error(key, e))
}

pub fn encode_status(key: &str, status: &AccountStatus) -> Result<String, StoreError> {
    serde_json::to_string(status).map_err(|e| StoreError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Decimal unix seconds, surrounding whitespace tolerated.
pub fn decode_force_logout(key: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    let secs: i64 = raw.trim().parse().map_err(|e| decode_error(key, e))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| StoreError::Decode {
        key: key.to_string(),
        reason: format!("timestamp {secs} is out of range"),
    })
}

pub fn encode_force_logout(at: DateTime<Utc>) -> String {
    at.timestamp().to_string()
}

/// `{"permissions": [...], "cached_at": ...}`; every entry must be a string.
pub fn decode_permissions(key: &str, raw: &str) -> Result<DynamicPermissionSet, StoreError> {
    serde_json::from_str(raw).map_err(|e| decode_error(key, e))
}

pub fn encode_permissions(key: &str, set: &DynamicPermissionSet) -> Result<String, StoreError> {
    serde_json::to_string(set).map_err(|e| StoreError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode_error(key: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Decode {
        key: key.to_string(),
        reason: err.to_string(),
    }
}
