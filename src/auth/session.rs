//! Session bookkeeping on top of a key/value store with per-key expiry.
//!
//! Every live access or refresh token has an entry mapping its identifier to
//! the owning subject. An entry never outlives the token that created it.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use redis::{AsyncCommands, IntoConnectionInfo};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::token::{refresh_id, AccessDetails, TokenPair};
use crate::error::StoreError;

pub const ONE_TIME_REFERENCE_TTL: Duration = Duration::from_secs(10 * 60);

const ONE_TIME_PREFIX: &str = "otp:";

/// Store key for a single entry.
///
/// Access and refresh keys are the token identifiers themselves. One-time
/// references are caller-chosen, so they live under their own prefix and
/// can never address a session entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn access(access_id: &str) -> Self {
        Self(access_id.to_string())
    }

    pub fn refresh(access_id: &str, subject_id: &str) -> Self {
        Self(refresh_id(access_id, subject_id))
    }

    /// Key for an already composed refresh identifier.
    pub fn from_refresh_id(refresh_id: &str) -> Self {
        Self(refresh_id.to_string())
    }

    pub fn one_time(reference_id: &str) -> Self {
        Self(format!("{}{}", ONE_TIME_PREFIX, reference_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal contract the session store needs from its backend.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Reads and deletes in one step. Of two concurrent callers at most one
    /// sees the value.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

/// `host:port` of a Redis URL, without credentials.
pub fn redis_endpoint(url: &str) -> String {
    url.into_connection_info()
        .map(|info| info.addr.to_string())
        .unwrap_or_else(|_| "invalid url".to_string())
}

/// Redis backend over a deadpool connection pool.
pub struct RedisStore {
    pool: deadpool_redis::Pool,
}

impl RedisStore {
    pub fn connect(url: &str, pool_size: usize, timeout: Duration) -> Result<Self, StoreError> {
        let mut config = deadpool_redis::Config::from_url(url);
        if let Some(ref mut pool_config) = config.pool {
            pool_config.max_size = pool_size;
            pool_config.timeouts.wait = Some(timeout);
            pool_config.timeouts.create = Some(timeout);
            pool_config.timeouts.recycle = Some(timeout);
        }

        let pool = config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!(endpoint = %redis_endpoint(url), pool_size, "session store pool created");
        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let millis = ttl.as_millis().max(1) as u64;
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.get_del::<_, Option<String>>(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-process backend. Expiry follows the tokio clock so paused-time tests
/// can move past a TTL. Expired entries are swept on every write.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let removed = self.entries.lock().remove(key);
        Ok(removed
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Result of a one-time reference check. Expired and never-written
/// references are the same thing to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceStatus {
    Present,
    Absent,
}

/// Time left until a unix-seconds deadline, `None` once it has passed.
fn ttl_until(expires_at: i64) -> Option<Duration> {
    let remaining = expires_at.saturating_mul(1000) - Utc::now().timestamp_millis();
    (remaining > 0).then(|| Duration::from_millis(remaining as u64))
}

pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    op_timeout: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, op_timeout: Duration) -> Self {
        Self { backend, op_timeout }
    }

    /// Runs one backend call under the per-operation deadline.
    async fn bounded<T>(
        &self,
        function: &'static str,
        key: &SessionKey,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let result = match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        };

        if let Err(ref e) = result {
            error!(function, key = %key, error = %e, "session store operation failed");
        }
        result
    }

    async fn write(&self, function: &'static str, key: &SessionKey, value: &str, expires_at: i64) -> Result<(), StoreError> {
        match ttl_until(expires_at) {
            Some(ttl) => {
                self.bounded(function, key, self.backend.set_with_ttl(key.as_str(), value, ttl))
                    .await
            }
            None => {
                warn!(function, key = %key, "token already expired, entry not written");
                Ok(())
            }
        }
    }

    async fn read(&self, function: &'static str, key: &SessionKey) -> Result<String, StoreError> {
        self.bounded(function, key, self.backend.get(key.as_str()))
            .await?
            .ok_or_else(|| {
                debug!(function, key = %key, "session entry not found");
                StoreError::NotFound
            })
    }

    async fn remove(&self, function: &'static str, key: &SessionKey) -> Result<(), StoreError> {
        self.bounded(function, key, self.backend.delete(key.as_str())).await
    }

    /// Records both halves of a freshly issued pair.
    pub async fn persist(&self, subject_id: &str, pair: &TokenPair) -> Result<(), StoreError> {
        self.write("persist", &SessionKey::access(&pair.access_id), subject_id, pair.access_expires_at)
            .await?;
        self.write(
            "persist",
            &SessionKey::from_refresh_id(&pair.refresh_id),
            subject_id,
            pair.refresh_expires_at,
        )
        .await
    }

    pub async fn lookup_access(&self, access_id: &str) -> Result<String, StoreError> {
        self.read("lookup_access", &SessionKey::access(access_id)).await
    }

    pub async fn lookup_refresh(&self, refresh_id: &str) -> Result<String, StoreError> {
        self.read("lookup_refresh", &SessionKey::from_refresh_id(refresh_id)).await
    }

    /// Removes the refresh entry and returns its owner. Only one caller can
    /// consume a given entry.
    pub async fn consume_refresh(&self, refresh_id: &str) -> Result<String, StoreError> {
        let key = SessionKey::from_refresh_id(refresh_id);
        self.bounded("consume_refresh", &key, self.backend.take(key.as_str()))
            .await?
            .ok_or_else(|| {
                debug!(function = "consume_refresh", key = %key, "refresh entry not found");
                StoreError::NotFound
            })
    }

    pub async fn revoke_access(&self, access_id: &str) -> Result<(), StoreError> {
        self.remove("revoke_access", &SessionKey::access(access_id)).await
    }

    pub async fn revoke_refresh(&self, refresh_id: &str) -> Result<(), StoreError> {
        self.remove("revoke_refresh", &SessionKey::from_refresh_id(refresh_id)).await
    }

    /// Deletes the access entry and its paired refresh entry.
    ///
    /// Both deletions are attempted; the first failure is returned.
    pub async fn revoke_session(&self, details: &AccessDetails) -> Result<(), StoreError> {
        let access = self.remove("revoke_session", &SessionKey::access(&details.access_id)).await;
        let refresh = self
            .remove(
                "revoke_session",
                &SessionKey::refresh(&details.access_id, &details.subject_id),
            )
            .await;
        access.and(refresh)
    }

    pub async fn put_one_time_reference(&self, reference_id: &str) -> Result<(), StoreError> {
        let key = SessionKey::one_time(reference_id);
        self.bounded(
            "put_one_time_reference",
            &key,
            self.backend.set_with_ttl(key.as_str(), "1", ONE_TIME_REFERENCE_TTL),
        )
        .await
    }

    pub async fn has_one_time_reference(&self, reference_id: &str) -> Result<ReferenceStatus, StoreError> {
        let key = SessionKey::one_time(reference_id);
        let value = self
            .bounded("has_one_time_reference", &key, self.backend.get(key.as_str()))
            .await?;

        Ok(match value.as_deref() {
            Some("1") | Some("true") => ReferenceStatus::Present,
            _ => ReferenceStatus::Absent,
        })
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", &SessionKey(String::new()), self.backend.ping()).await
    }
}
