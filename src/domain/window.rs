//! Sliding-window log of accepted votes.
//!
//! Each answer option keeps the unix timestamps (second resolution) of its recently
//! accepted votes. Readers always re-prune against the current window before
//! counting, so a stale timestamp never counts even if it has not been evicted
//! from the backing store yet.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Ordered acceptance timestamps for one option.
///
/// # Example
/// ```
/// use ballot_guard::WindowLog;
/// use std::time::Duration;
///
/// let window = Duration::from_secs(60);
/// let mut log = WindowLog::new();
/// log.push(1_000);
/// log.push(1_030);
///
/// assert_eq!(log.count_within(1_050, window), 2);
/// // 1_000 falls out of the window at 1_061
/// assert_eq!(log.count_within(1_061, window), 1);
/// assert_eq!(log.oldest_within(1_061, window), Some(1_030));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLog {
    timestamps: VecDeque<i64>,
}

impl WindowLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    /// Create a log from arbitrary timestamps.
    pub fn from_timestamps(timestamps: impl IntoIterator<Item = i64>) -> Self {
        let mut sorted: Vec<i64> = timestamps.into_iter().collect();
        sorted.sort_unstable();
        Self {
            timestamps: sorted.into(),
        }
    }

    /// First second still inside a window ending at `now`.
    pub fn window_start(now: i64, window: Duration) -> i64 {
        let span = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(span)
    }

    /// Append an acceptance timestamp, keeping the log ordered.
    pub fn push(&mut self, timestamp: i64) {
        match self.timestamps.back() {
            Some(&last) if last > timestamp => {
                let at = self.timestamps.partition_point(|&ts| ts <= timestamp);
                self.timestamps.insert(at, timestamp);
            }
            _ => self.timestamps.push_back(timestamp),
        }
    }

    /// Drop timestamps older than the window ending at `now`.
    ///
    /// Returns the number of removed entries.
    pub fn prune(&mut self, now: i64, window: Duration) -> usize {
        let start = Self::window_start(now, window);
        let mut removed = 0;
        while let Some(&oldest) = self.timestamps.front() {
            if oldest < start {
                self.timestamps.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    /// Count timestamps inside the window without mutating the log.
    pub fn count_within(&self, now: i64, window: Duration) -> usize {
        let start = Self::window_start(now, window);
        self.timestamps.iter().filter(|&&ts| ts >= start).count()
    }

    /// Oldest timestamp inside the window.
    pub fn oldest_within(&self, now: i64, window: Duration) -> Option<i64> {
        let start = Self::window_start(now, window);
        self.timestamps.iter().copied().find(|&ts| ts >= start)
    }

    /// Number of retained timestamps, pruned or not.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Iterate over retained timestamps, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.timestamps.iter().copied()
    }

    /// Remove every timestamp.
    pub fn clear(&mut self) {
        self.timestamps.clear();
    }
}
