//! Minute buckets and cluster kinds.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A usage time truncated to the minute.
///
/// Keys order chronologically and display as `YYYY-MM-DD HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinuteKey(i64);

impl MinuteKey {
    /// Bucket key of a timestamp.
    pub fn of(timestamp: NaiveDateTime) -> Self {
        MinuteKey(timestamp.and_utc().timestamp().div_euclid(60))
    }

    /// Whole minutes from `self` to `later` (negative if `later` is earlier).
    pub fn minutes_until(self, later: MinuteKey) -> i64 {
        later.0.saturating_sub(self.0)
    }

    /// First second of the bucket.
    pub fn start(self) -> NaiveDateTime {
        DateTime::<Utc>::from_timestamp(self.0.saturating_mul(60), 0)
            .unwrap_or_default()
            .naive_utc()
    }

    /// Minutes since the unix epoch.
    pub fn as_minutes(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MinuteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start().format("%Y-%m-%d %H:%M"))
    }
}

impl Serialize for MinuteKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Time-proximity rule a cluster satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    /// Tokens used inside the same minute bucket
    SameMinute,
    /// Tokens in buckets exactly one minute apart
    OneMinuteDiff,
    /// Tokens in buckets exactly two minutes apart
    TwoMinuteDiff,
}

impl ClusterKind {
    /// Kind matching a gap in minutes between two occupied buckets.
    pub fn for_gap(minutes: i64) -> Option<Self> {
        match minutes {
            0 => Some(ClusterKind::SameMinute),
            1 => Some(ClusterKind::OneMinuteDiff),
            2 => Some(ClusterKind::TwoMinuteDiff),
            _ => None,
        }
    }

    /// Label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            ClusterKind::SameMinute => "same minute",
            ClusterKind::OneMinuteDiff => "1 minute apart",
            ClusterKind::TwoMinuteDiff => "2 minutes apart",
        }
    }
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
