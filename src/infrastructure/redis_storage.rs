//! Redis-backed counter store.
//!
//! Lets every application instance admitting votes share one set of per-option
//! window logs.
//!
//! ## Architecture
//!
//! - Keys: the gate's namespaced key (`rate:option:{id}`) behind a configurable prefix
//! - Values: bincode-encoded [`WindowLog`]
//! - TTL: set on every write (`SET ... EX`), so idle options clean themselves up
//!
//! ## Atomic updates
//!
//! `update` is a compare-and-swap loop: read the current bytes, apply the closure
//! locally, then write through a Lua script that only replaces the value if it is
//! still byte-identical to what was read. A lost race re-reads and retries, up to
//! `max_cas_attempts` times, after which the update fails with
//! [`StoreError::Contention`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use ballot_guard::{RateLimiterGate, RedisCounterStore, RedisCounterStoreConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedisCounterStore::connect_with_config(
//!         "redis://127.0.0.1/",
//!         RedisCounterStoreConfig::default(),
//!     )
//!     .await
//!     .expect("Failed to connect to Redis");
//!
//!     let gate = RateLimiterGate::builder().build_with_store(store).unwrap();
//! }
//! ```

use crate::application::ports::{CounterStore, StoreError};
use crate::domain::window::WindowLog;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Replaces KEYS[1] with ARGV[2] (TTL ARGV[3]) only if it still holds ARGV[1].
/// An empty ARGV[1] means "absent"; encoded logs are never empty.
const COMPARE_AND_SET: &str = r#"
local current = redis.call('GET', KEYS[1])
if (current == false and ARGV[1] == '') or current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
"#;

/// Configuration for Redis storage.
#[derive(Debug, Clone)]
pub struct RedisCounterStoreConfig {
    /// Prefix in front of every key (default: "ballot-guard:")
    pub key_prefix: String,
    /// Compare-and-swap attempts before giving up (default: 16)
    pub max_cas_attempts: usize,
}

impl Default for RedisCounterStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ballot-guard:".to_string(),
            max_cas_attempts: 16,
        }
    }
}

/// Redis-backed storage for distributed vote gating.
pub struct RedisCounterStore {
    connection: Arc<RwLock<ConnectionManager>>,
    config: RedisCounterStoreConfig,
    script: Arc<Script>,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Clone for RedisCounterStore {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            config: self.config.clone(),
            script: Arc::clone(&self.script),
        }
    }
}

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl RedisCounterStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisCounterStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisCounterStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
            config,
            script: Arc::new(Script::new(COMPARE_AND_SET)),
        })
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<WindowLog, StoreError> {
        bincode::deserialize(bytes).map_err(|_| StoreError::Corrupted {
            key: key.to_string(),
        })
    }

    fn encode(key: &str, log: &WindowLog) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(log).map_err(|_| StoreError::Corrupted {
            key: key.to_string(),
        })
    }

    fn ttl_secs(ttl: Duration) -> u64 {
        // SET EX rejects zero
        ttl.as_secs().max(1)
    }

    async fn read_raw(&self, redis_key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection.write().await;
        let bytes: Option<Vec<u8>> = conn.get(redis_key).await?;
        Ok(bytes)
    }

    async fn compare_and_set(
        &self,
        redis_key: &str,
        expected: &[u8],
        replacement: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection.write().await;
        let swapped: i32 = self
            .script
            .key(redis_key)
            .arg(expected)
            .arg(replacement)
            .arg(Self::ttl_secs(ttl))
            .invoke_async(&mut *conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.write().await;
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await?;

            if !keys.is_empty() {
                conn.del::<_, ()>(&keys).await?;
            }

            if next_cursor == 0 {
                return Ok(());
            }
            cursor = next_cursor;
        }
    }
}

/// Escape the characters `SCAN MATCH` treats as glob syntax.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Run a future to completion from the synchronous `CounterStore` API.
///
/// Inside a multi-threaded tokio runtime the current worker is handed over with
/// `block_in_place`; outside of any runtime a temporary one is created.
fn block_on<F, T>(future: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        tokio::task::block_in_place(|| handle.block_on(future))
    } else {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| StoreError::Backend(format!("failed to create tokio runtime: {e}")))?;
        rt.block_on(future)
    }
}

impl CounterStore for RedisCounterStore {
    fn get(&self, key: &str) -> Result<Option<WindowLog>, StoreError> {
        let redis_key = self.redis_key(key);
        block_on(async {
            match self.read_raw(&redis_key).await? {
                Some(bytes) => Self::decode(key, &bytes).map(Some),
                None => Ok(None),
            }
        })
    }

    fn put(&self, key: &str, log: WindowLog, ttl: Duration) -> Result<(), StoreError> {
        let redis_key = self.redis_key(key);
        let bytes = Self::encode(key, &log)?;
        block_on(async {
            let mut conn = self.connection.write().await;
            conn.set_ex::<_, _, ()>(&redis_key, bytes, Self::ttl_secs(ttl))
                .await?;
            Ok(())
        })
    }

    fn forget(&self, key: &str) -> Result<(), StoreError> {
        let redis_key = self.redis_key(key);
        block_on(async {
            let mut conn = self.connection.write().await;
            conn.del::<_, ()>(&redis_key).await?;
            Ok(())
        })
    }

    fn update<R, F>(&self, key: &str, ttl: Duration, mut f: F) -> Result<R, StoreError>
    where
        F: FnMut(&mut WindowLog) -> R,
    {
        let redis_key = self.redis_key(key);
        let attempts = self.config.max_cas_attempts.max(1);

        block_on(async {
            for attempt in 1..=attempts {
                let current = self.read_raw(&redis_key).await?;
                let mut log = match &current {
                    Some(bytes) => match Self::decode(key, bytes) {
                        Ok(log) => log,
                        Err(e) => {
                            // Overwrite undecodable values instead of wedging the option
                            tracing::warn!(error = %e, key = %redis_key, "Replacing corrupted window log");
                            WindowLog::new()
                        }
                    },
                    None => WindowLog::new(),
                };

                let result = f(&mut log);
                let replacement = Self::encode(key, &log)?;
                let expected = current.as_deref().unwrap_or_default();

                if self
                    .compare_and_set(&redis_key, expected, &replacement, ttl)
                    .await?
                {
                    return Ok(result);
                }

                tracing::debug!(key = %redis_key, attempt, "Window log changed concurrently, retrying");
            }

            Err(StoreError::Contention {
                key: key.to_string(),
                attempts,
            })
        })
    }

    fn clear_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        let pattern = format!("{}*", escape_glob(&self.redis_key(namespace)));
        block_on(self.delete_matching(&pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("ballot-guard:rate:option:"), "ballot-guard:rate:option:");
        assert_eq!(escape_glob("tenant[1]*?"), "tenant\\[1\\]\\*\\?");
        assert_eq!(escape_glob("a\\b"), "a\\\\b");
    }
}
