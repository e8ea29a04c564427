//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::usage::{SurveyId, TokenUsage};
use crate::domain::window::WindowLog;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Port for obtaining current time.
///
/// Infrastructure provides concrete implementations (SystemClock, ManualClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Errors raised by a counter store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("counter store backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("corrupted window log at key {key}")]
    Corrupted {
        /// Offending key
        key: String,
    },

    /// Optimistic updates kept conflicting with concurrent writers.
    #[error("gave up updating {key} after {attempts} conflicting attempts")]
    Contention {
        /// Contended key
        key: String,
        /// Attempts made
        attempts: usize,
    },
}

/// Port for the shared key-value store holding per-option window logs.
///
/// Entries written through `put` or `update` expire after their TTL; an expired
/// entry reads as absent.
///
/// `update` is the only way the gate mutates state. It must be atomic per key:
/// no other writer may interleave between reading the current log and persisting
/// the modified one. Optimistic backends may invoke `f` more than once, so `f`
/// must not have side effects beyond the log it is given.
pub trait CounterStore: Send + Sync + Debug {
    /// Read the log stored at `key`.
    fn get(&self, key: &str) -> Result<Option<WindowLog>, StoreError>;

    /// Replace the log stored at `key`.
    fn put(&self, key: &str, log: WindowLog, ttl: Duration) -> Result<(), StoreError>;

    /// Delete the log stored at `key`.
    fn forget(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically modify the log at `key` (empty when absent) and persist it with `ttl`.
    fn update<R, F>(&self, key: &str, ttl: Duration, f: F) -> Result<R, StoreError>
    where
        F: FnMut(&mut WindowLog) -> R;

    /// Delete every log whose key starts with `namespace`.
    fn clear_namespace(&self, namespace: &str) -> Result<(), StoreError>;
}

impl<T> CounterStore for Arc<T>
where
    T: CounterStore,
{
    fn get(&self, key: &str) -> Result<Option<WindowLog>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, log: WindowLog, ttl: Duration) -> Result<(), StoreError> {
        (**self).put(key, log, ttl)
    }

    fn forget(&self, key: &str) -> Result<(), StoreError> {
        (**self).forget(key)
    }

    fn update<R, F>(&self, key: &str, ttl: Duration, f: F) -> Result<R, StoreError>
    where
        F: FnMut(&mut WindowLog) -> R,
    {
        (**self).update(key, ttl, f)
    }

    fn clear_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        (**self).clear_namespace(namespace)
    }
}

/// Errors raised while loading token usages.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The vote/token store could not be reached.
    #[error("usage source unavailable: {0}")]
    Unavailable(String),

    /// The query for used tokens failed.
    #[error("usage query for surveys {surveys:?} failed: {reason}")]
    Query {
        /// Surveys queried
        surveys: Vec<SurveyId>,
        /// Backend message
        reason: String,
    },
}

/// Port for the read-only query that supplies token usages.
///
/// Implementations return only tokens already marked as used, with their votes,
/// ordered by usage time ascending.
pub trait UsageSource: Send + Sync {
    /// Load the used tokens of the given surveys.
    fn used_tokens(&self, surveys: &[SurveyId]) -> Result<Vec<TokenUsage>, SourceError>;
}

impl<T> UsageSource for Arc<T>
where
    T: UsageSource + ?Sized,
{
    fn used_tokens(&self, surveys: &[SurveyId]) -> Result<Vec<TokenUsage>, SourceError> {
        (**self).used_tokens(surveys)
    }
}
