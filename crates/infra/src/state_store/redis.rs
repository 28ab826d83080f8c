//! Redis-backed state store.
//!
//! One multiplexed [`ConnectionManager`] is shared by all requests and owns
//! reconnects once established. The initial connection is never made on the
//! request path: [`RedisStateStore::establish`] tries once at startup and hands
//! off to a background task that retries with backoff. Until then every
//! command fails fast as unavailable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ErrorKind, IntoConnectionInfo, RedisError};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use authgate_auth::{KeyValueBackend, StoreError};

use crate::config::RedisSettings;

/// Upper bound on a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RETRY_BACKOFF_START: Duration = Duration::from_millis(250);
const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(5);

pub struct RedisStateStore {
    client: redis::Client,
    connection: Arc<OnceCell<ConnectionManager>>,
    command_timeout: Duration,
}

impl RedisStateStore {
    /// Build a client from settings. Performs no IO.
    pub fn new(settings: &RedisSettings) -> Result<Self, RedisError> {
        let mut info = settings.url.as_str().into_connection_info()?;
        if settings.password.is_some() {
            info.redis.password = settings.password.clone();
        }
        if settings.db != 0 {
            info.redis.db = settings.db;
        }

        Ok(Self {
            client: redis::Client::open(info)?,
            connection: Arc::new(OnceCell::new()),
            command_timeout: settings.command_timeout,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// Connect now; on failure keep retrying in the background and report
    /// the first error. Must be called from within a tokio runtime.
    pub async fn establish(&self) -> Result<(), StoreError> {
        match connect(&self.client, &self.connection).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.reconnect_in_background();
                Err(err)
            }
        }
    }

    /// Retry the initial connection with exponential backoff until it
    /// succeeds. Returns immediately if already connected.
    pub fn reconnect_in_background(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let cell = self.connection.clone();

        tokio::spawn(async move {
            let mut backoff = RETRY_BACKOFF_START;
            while !cell.initialized() {
                match connect(&client, &cell).await {
                    Ok(()) => break,
                    Err(err) => {
                        warn!(error = %err, retry_in_ms = backoff.as_millis() as u64, "state store connect failed");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(RETRY_BACKOFF_MAX);
                    }
                }
            }
        })
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.connection
            .get()
            .cloned()
            .ok_or_else(|| StoreError::Unavailable("not connected".to_string()))
    }

    async fn bounded<T, F>(&self, command: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(StoreError::Unavailable(err.to_string())),
            Err(_) => Err(StoreError::TimedOut(self.command_timeout)),
        }
    }
}

async fn connect(
    client: &redis::Client,
    cell: &OnceCell<ConnectionManager>,
) -> Result<(), StoreError> {
    let attempt = async {
        let mut manager = ConnectionManager::new(client.clone()).await?;
        redis::cmd("PING").query_async::<_, String>(&mut manager).await?;
        Ok::<_, RedisError>(manager)
    };

    let manager = match tokio::time::timeout(CONNECT_TIMEOUT, attempt).await {
        Ok(Ok(manager)) => manager,
        Ok(Err(err)) => return Err(StoreError::Unavailable(err.to_string())),
        Err(_) => return Err(StoreError::TimedOut(CONNECT_TIMEOUT)),
    };

    // A concurrent attempt may have won; its connection is kept.
    if cell.set(manager).is_ok() {
        info!("state store connection established");
    }
    Ok(())
}

#[async_trait]
impl KeyValueBackend for RedisStateStore {
    #[instrument(skip(self), level = "trace")]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        let mut command = redis::cmd("GET");
        command.arg(key);
        let reply = command.query_async::<_, Option<String>>(&mut conn);

        match tokio::time::timeout(self.command_timeout, reply).await {
            Ok(Ok(value)) => Ok(value),
            // A non-string value under one of our keys is bad data, not an outage.
            Ok(Err(err)) if err.kind() == ErrorKind::TypeError => Err(StoreError::Decode {
                key: key.to_string(),
                reason: err.to_string(),
            }),
            Ok(Err(err)) => Err(StoreError::Unavailable(err.to_string())),
            Err(_) => Err(StoreError::TimedOut(self.command_timeout)),
        }
    }

    #[instrument(skip(self, value), level = "trace")]
    async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let mut command = redis::cmd("SET");
        command.arg(key).arg(value).arg("EX").arg(ttl.as_secs().max(1));

        self.bounded(command.query_async::<_, ()>(&mut conn)).await
    }
}

impl core::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisStateStore")
            .field("connected", &self.connection.initialized())
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use authgate_auth::{StateReader, StateWriter, StoreOutcome, SubjectId};

    use super::*;

    fn unreachable_store() -> RedisStateStore {
        let mut settings = RedisSettings::new("redis://127.0.0.1:1/");
        settings.command_timeout = Duration::from_millis(200);
        RedisStateStore::new(&settings).unwrap()
    }

    #[test]
    fn rejects_invalid_urls() {
        assert!(RedisStateStore::new(&RedisSettings::new("not a url")).is_err());
    }

    #[test]
    fn construction_does_not_connect() {
        let store = unreachable_store();
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn reads_fail_fast_without_connecting() {
        let store = unreachable_store();
        let subject = SubjectId::new("user-1");

        let started = std::time::Instant::now();
        match store.account_status(&subject).await {
            StoreOutcome::Failed(err) => assert!(err.is_unavailable(), "unexpected error: {err}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_millis(50));
        assert!(store.set_force_logout_marker(&subject).await.is_err());
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn failed_establish_keeps_retrying_in_background() {
        let store = unreachable_store();
        assert!(store.establish().await.is_err());

        let retry = store.reconnect_in_background();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!retry.is_finished());
        assert!(!store.is_connected());
        retry.abort();
    }
}
