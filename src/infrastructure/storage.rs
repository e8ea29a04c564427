//! In-process counter store.
//!
//! Provides concurrent, sharded storage for per-option window logs with TTL
//! expiry, suitable when every vote submission path runs in one process.
//!
//! Expired entries are removed when a read finds them, and a full sweep runs
//! every `purge_interval` updates so options that are never read again do not
//! accumulate.

use crate::application::ports::{Clock, CounterStore, StoreError};
use crate::domain::window::WindowLog;
use crate::infrastructure::clock::SystemClock;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Slot {
    log: WindowLog,
    /// Unix second at which the slot stops being readable
    expires_at: i64,
}

impl Slot {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Default number of updates between two sweeps of expired entries.
pub const DEFAULT_PURGE_INTERVAL: u64 = 1024;

fn expiry(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

/// Thread-safe sharded counter store backed by DashMap.
///
/// `update` runs its closure while holding the key's shard write lock, so
/// concurrent updates of one option are serialized while different options
/// proceed in parallel.
#[derive(Debug)]
pub struct ShardedCounterStore {
    map: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
    purge_interval: u64,
    updates: AtomicU64,
}

impl ShardedCounterStore {
    /// Create a store that expires entries against the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a store that expires entries against a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            clock,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            updates: AtomicU64::new(0),
        }
    }

    /// Sweep expired entries every `updates` updates (0 disables the sweep).
    pub fn with_purge_interval(mut self, updates: u64) -> Self {
        self.purge_interval = updates;
        self
    }

    fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let before = self.map.len();
        self.map.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.map.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for ShardedCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for ShardedCounterStore {
    fn get(&self, key: &str) -> Result<Option<WindowLog>, StoreError> {
        let now = self.now();
        self.map.remove_if(key, |_, slot| slot.is_expired(now));
        Ok(self
            .map
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.log.clone()))
    }

    fn put(&self, key: &str, log: WindowLog, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = expiry(self.now(), ttl);
        self.map.insert(key.to_string(), Slot { log, expires_at });
        Ok(())
    }

    fn forget(&self, key: &str) -> Result<(), StoreError> {
        self.map.remove(key);
        Ok(())
    }

    fn update<R, F>(&self, key: &str, ttl: Duration, mut f: F) -> Result<R, StoreError>
    where
        F: FnMut(&mut WindowLog) -> R,
    {
        let now = self.now();
        let result = {
            let mut slot = self.map.entry(key.to_string()).or_insert_with(|| Slot {
                log: WindowLog::new(),
                expires_at: now,
            });

            if slot.is_expired(now) {
                slot.log.clear();
            }

            let result = f(&mut slot.log);
            slot.expires_at = expiry(now, ttl);
            result
        };

        // The shard guard is released above; sweeping takes every shard lock.
        if self.purge_interval > 0 {
            let count = self.updates.fetch_add(1, Ordering::Relaxed) + 1;
            if count % self.purge_interval == 0 {
                self.purge_expired();
            }
        }

        Ok(result)
    }

    fn clear_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        self.map.retain(|key, _| !key.starts_with(namespace));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::thread;

    const TTL: Duration = Duration::from_secs(120);

    fn store_with_clock() -> (ShardedCounterStore, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 10, 23, 13, 0, 0).unwrap());
        (ShardedCounterStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_put_get_forget() {
        let (store, _clock) = store_with_clock();
        let log = WindowLog::from_timestamps([1, 2]);

        store.put("rate:option:1", log.clone(), TTL).unwrap();
        assert_eq!(store.get("rate:option:1").unwrap(), Some(log));
        assert_eq!(store.get("rate:option:2").unwrap(), None);

        store.forget("rate:option:1").unwrap();
        assert_eq!(store.get("rate:option:1").unwrap(), None);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let (store, clock) = store_with_clock();
        store
            .put("k", WindowLog::from_timestamps([1]), TTL)
            .unwrap();

        clock.advance(Duration::from_secs(119));
        assert!(store.get("k").unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_update_starts_empty_and_persists() {
        let (store, _clock) = store_with_clock();

        let len = store
            .update("k", TTL, |log| {
                log.push(10);
                log.len()
            })
            .unwrap();

        assert_eq!(len, 1);
        assert_eq!(store.get("k").unwrap(), Some(WindowLog::from_timestamps([10])));
    }

    #[test]
    fn test_update_resets_expired_log() {
        let (store, clock) = store_with_clock();
        store
            .put("k", WindowLog::from_timestamps([1, 2, 3]), TTL)
            .unwrap();

        clock.advance(Duration::from_secs(300));
        let len = store.update("k", TTL, |log| log.len()).unwrap();

        assert_eq!(len, 0);
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = store_with_clock();
        store.put("old", WindowLog::new(), Duration::from_secs(10)).unwrap();
        store.put("new", WindowLog::new(), TTL).unwrap();

        clock.advance(Duration::from_secs(60));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("new").unwrap().is_some());
    }

    #[test]
    fn test_clear_namespace() {
        let (store, _clock) = store_with_clock();
        store.put("rate:option:1", WindowLog::new(), TTL).unwrap();
        store.put("rate:option:2", WindowLog::new(), TTL).unwrap();
        store.put("other:1", WindowLog::new(), TTL).unwrap();

        store.clear_namespace("rate:option:").unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("other:1").unwrap().is_some());
    }

    #[test]
    fn test_get_drops_expired_entry() {
        let (store, clock) = store_with_clock();
        store.put("k", WindowLog::from_timestamps([1]), TTL).unwrap();

        clock.advance(Duration::from_secs(120));
        assert!(store.get("k").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_updates_sweep_expired_entries() {
        let (store, clock) = store_with_clock();
        let store = store.with_purge_interval(4);
        for key in ["a", "b", "c"] {
            store.update(key, TTL, |log| log.push(1)).unwrap();
        }

        clock.advance(Duration::from_secs(3600));
        // Fourth update triggers the sweep; only "live" remains
        store.update("live", TTL, |log| log.push(2)).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get("live").unwrap().is_some());
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(ShardedCounterStore::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    store
                        .update("shared", TTL, |log| log.push(i * 100 + j))
                        .unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("shared").unwrap().unwrap().len(), 1000);
    }
}
