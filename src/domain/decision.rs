//! Admission decisions produced by the vote gate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a vote was not admitted as countable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The option already received its quota of votes inside the window
    TwoVotesPerMinutePerOption,
    /// The counter store could not be read or written; the gate fails closed
    CounterStoreUnavailable,
}

impl DenialReason {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::TwoVotesPerMinutePerOption => "two_votes_per_minute_per_option",
            DenialReason::CounterStoreUnavailable => "counter_store_unavailable",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of asking whether an option may receive another countable vote.
///
/// A denied decision is never shown to the voter: the vote is still stored,
/// just flagged as not countable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDecision {
    /// Whether the vote counts
    pub allowed: bool,
    /// Reason for a denial
    pub reason: Option<DenialReason>,
    /// Accepted votes inside the current window, before this one
    pub votes_in_window: usize,
    /// Seconds until the oldest accepted vote leaves the window (0 when allowed)
    pub remaining_seconds: u64,
}

impl VoteDecision {
    /// An admitting decision.
    pub fn allow(votes_in_window: usize) -> Self {
        Self {
            allowed: true,
            reason: None,
            votes_in_window,
            remaining_seconds: 0,
        }
    }

    /// A denial because the option's quota is used up.
    pub fn quota_reached(votes_in_window: usize, remaining_seconds: u64) -> Self {
        Self {
            allowed: false,
            reason: Some(DenialReason::TwoVotesPerMinutePerOption),
            votes_in_window,
            remaining_seconds,
        }
    }

    /// A denial because the counter store failed.
    pub fn store_unavailable() -> Self {
        Self {
            allowed: false,
            reason: Some(DenialReason::CounterStoreUnavailable),
            votes_in_window: 0,
            remaining_seconds: 0,
        }
    }

    /// Check if this decision admits the vote.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Check if this decision denies the vote.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Human-readable explanation for logs and admin views.
    pub fn message(&self) -> Option<String> {
        match self.reason? {
            DenialReason::TwoVotesPerMinutePerOption => Some(format!(
                "option already received {} votes in the current window; wait {} seconds",
                self.votes_in_window, self.remaining_seconds
            )),
            DenialReason::CounterStoreUnavailable => {
                Some("vote counter unavailable; vote stored as not countable".to_string())
            }
        }
    }
}

/// Diagnostic snapshot of one option's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionStats {
    /// Whether any timestamp is stored for the option
    pub has_recent_votes: bool,
    /// Accepted votes inside the current window
    pub votes_in_window: usize,
    /// Whether a vote would be admitted right now
    pub can_vote_now: bool,
    /// Votes still admissible inside the current window
    pub slots_available: usize,
    /// Seconds until a slot frees up (0 when one is available)
    pub remaining_seconds: u64,
}

impl OptionStats {
    /// Stats of an option with no stored votes.
    pub fn idle(max_votes: usize) -> Self {
        Self {
            has_recent_votes: false,
            votes_in_window: 0,
            can_vote_now: true,
            slots_available: max_votes,
            remaining_seconds: 0,
        }
    }

    /// Stats reported when the counter store cannot be read.
    ///
    /// Mirrors the gate's fail-closed decision: no slot is available.
    pub fn unavailable() -> Self {
        Self {
            has_recent_votes: false,
            votes_in_window: 0,
            can_vote_now: false,
            slots_available: 0,
            remaining_seconds: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_has_no_message() {
        let decision = VoteDecision::allow(1);
        assert!(decision.is_allowed());
        assert_eq!(decision.message(), None);
    }

    #[test]
    fn test_quota_message() {
        let decision = VoteDecision::quota_reached(2, 17);
        assert!(decision.is_denied());
        assert_eq!(
            decision.reason,
            Some(DenialReason::TwoVotesPerMinutePerOption)
        );
        let message = decision.message().unwrap();
        assert!(message.contains("2 votes"));
        assert!(message.contains("17 seconds"));
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(
            DenialReason::TwoVotesPerMinutePerOption.to_string(),
            "two_votes_per_minute_per_option"
        );
        assert_eq!(
            DenialReason::CounterStoreUnavailable.as_str(),
            "counter_store_unavailable"
        );
    }

    #[test]
    fn test_idle_stats() {
        let stats = OptionStats::idle(2);
        assert!(stats.can_vote_now);
        assert_eq!(stats.slots_available, 2);
        assert!(!stats.has_recent_votes);
    }

    #[test]
    fn test_unavailable_stats_refuse_votes() {
        let stats = OptionStats::unavailable();
        assert!(!stats.can_vote_now);
        assert_eq!(stats.slots_available, 0);
    }
}
