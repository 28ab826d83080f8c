use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use authgate_auth::store::{PERMISSIONS_TTL, codec, dynamic_permissions_key};
use authgate_auth::{DynamicPermissionSet, KeyValueBackend, StoreError, SubjectId};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process state store for tests/dev.
///
/// Honours expiry like the networked store, and can be switched into an
/// "unavailable" mode to exercise fallbacks.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    inner: RwLock<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every read and write fails as if the store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Store a raw value as-is (no encoding, no validation).
    pub fn put_raw(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(
                key.into(),
                Entry {
                    value: value.into(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    /// Populate a subject's dynamic permission set, as the permission
    /// service would.
    pub fn seed_dynamic_permissions<I, S>(&self, subject: &SubjectId, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = dynamic_permissions_key(subject);
        let set = DynamicPermissionSet {
            permissions: permissions.into_iter().map(Into::into).collect(),
            cached_at: Some(Utc::now()),
        };
        if let Ok(value) = codec::encode_permissions(&key, &set) {
            self.put_raw(key, value, PERMISSIONS_TTL);
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(key);
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;

        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))?;
        Ok(map
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.check_available()?;

        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))?;
        let now = Instant::now();
        map.retain(|_, entry| entry.expires_at > now);
        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
