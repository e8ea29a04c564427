//! Registry of per-option window logs.
//!
//! The registry owns the key namespace, window length and TTL contract on top of
//! a [`CounterStore`], and hands callers the log of an option together with the
//! current time.

use crate::application::ports::{Clock, CounterStore, StoreError};
use crate::domain::usage::OptionId;
use crate::domain::window::WindowLog;
use std::sync::Arc;
use std::time::Duration;

/// Default key namespace for option logs.
pub const DEFAULT_KEY_PREFIX: &str = "rate:option:";

/// Window logs of all options, keyed as `{prefix}{option_id}`.
///
/// This type is generic over the store implementation. In a single process use
/// `Arc<ShardedCounterStore>`; across processes use `RedisCounterStore`.
#[derive(Debug, Clone)]
pub struct WindowRegistry<S>
where
    S: CounterStore,
{
    store: S,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    window: Duration,
}

impl<S> WindowRegistry<S>
where
    S: CounterStore,
{
    /// Create a registry over `store`.
    pub fn new(store: S, clock: Arc<dyn Clock>, key_prefix: String, window: Duration) -> Self {
        Self {
            store,
            clock,
            key_prefix,
            window,
        }
    }

    /// Store key of an option.
    pub fn key(&self, option_id: OptionId) -> String {
        format!("{}{}", self.key_prefix, option_id)
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Expiry applied to every write: the window plus an equal safety margin.
    pub fn ttl(&self) -> Duration {
        self.window.saturating_mul(2)
    }

    /// Current unix second according to the registry clock.
    pub fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// Read an option's log (empty when absent) along with the current time.
    pub fn load(&self, option_id: OptionId) -> Result<(WindowLog, i64), StoreError> {
        let now = self.now();
        let log = self.store.get(&self.key(option_id))?.unwrap_or_default();
        Ok((log, now))
    }

    /// Atomically modify an option's log.
    ///
    /// The callback receives the log and the current unix second. It may run more
    /// than once on optimistic stores.
    pub fn with_log<F, R>(&self, option_id: OptionId, mut f: F) -> Result<R, StoreError>
    where
        F: FnMut(&mut WindowLog, i64) -> R,
    {
        let now = self.now();
        self.store
            .update(&self.key(option_id), self.ttl(), |log| f(log, now))
    }

    /// Drop an option's log.
    pub fn forget(&self, option_id: OptionId) -> Result<(), StoreError> {
        self.store.forget(&self.key(option_id))
    }

    /// Drop every option log under this registry's key prefix.
    ///
    /// Other keys sharing the store are left alone.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.clear_namespace(&self.key_prefix)
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}
