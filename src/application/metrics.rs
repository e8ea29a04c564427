//! Observability metrics for the vote gate.
//!
//! Provides counters about admission behavior for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking vote admission statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads. Clones
/// share the same counters.
#[derive(Debug, Clone)]
pub struct GateMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Votes recorded as countable
    votes_admitted: AtomicU64,
    /// Votes refused as countable
    votes_denied: AtomicU64,
    /// Counter store operations that failed
    store_failures: AtomicU64,
}

impl GateMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                votes_admitted: AtomicU64::new(0),
                votes_denied: AtomicU64::new(0),
                store_failures: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.votes_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied(&self) {
        self.inner.votes_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of votes admitted as countable.
    pub fn votes_admitted(&self) -> u64 {
        self.inner.votes_admitted.load(Ordering::Relaxed)
    }

    /// Get the total number of votes refused as countable.
    pub fn votes_denied(&self) -> u64 {
        self.inner.votes_denied.load(Ordering::Relaxed)
    }

    /// Get the total number of failed counter store operations.
    pub fn store_failures(&self) -> u64 {
        self.inner.store_failures.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> GateMetricsSnapshot {
        GateMetricsSnapshot {
            votes_admitted: self.votes_admitted(),
            votes_denied: self.votes_denied(),
            store_failures: self.store_failures(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.votes_admitted.store(0, Ordering::Relaxed);
        self.inner.votes_denied.store(0, Ordering::Relaxed);
        self.inner.store_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for GateMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of gate metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateMetricsSnapshot {
    /// Votes recorded as countable
    pub votes_admitted: u64,
    /// Votes refused as countable
    pub votes_denied: u64,
    /// Counter store operations that failed
    pub store_failures: u64,
}

impl GateMetricsSnapshot {
    /// Ratio of denied votes to all decided votes (0.0 to 1.0).
    ///
    /// Returns 0.0 if no votes have been decided.
    pub fn denial_rate(&self) -> f64 {
        let total = self.votes_admitted.saturating_add(self.votes_denied);
        if total == 0 {
            0.0
        } else {
            self.votes_denied as f64 / total as f64
        }
    }

    /// Total votes decided.
    pub fn total_votes(&self) -> u64 {
        self.votes_admitted.saturating_add(self.votes_denied)
    }
}
