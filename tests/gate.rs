//! Integration tests for the vote gate: window semantics, concurrency and
//! failure handling.

use ballot_guard::{
    CounterStore, DenialReason, ExecutionMode, GateMetrics, ManualClock, RateLimiterGate,
    ShardedCounterStore, StoreError, WindowLog,
};
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ballot_guard=debug")
        .with_test_writer()
        .try_init();
}

fn manual_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 10, 23, 10, 0, 0).unwrap())
}

fn gate(clock: &ManualClock) -> RateLimiterGate<Arc<ShardedCounterStore>> {
    RateLimiterGate::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_mode(ExecutionMode::NonProduction)
        .build()
        .unwrap()
}

/// Store whose every operation fails.
#[derive(Debug)]
struct UnreachableStore;

impl CounterStore for UnreachableStore {
    fn get(&self, _key: &str) -> Result<Option<WindowLog>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    fn put(&self, _key: &str, _log: WindowLog, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    fn forget(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    fn update<R, F>(&self, _key: &str, _ttl: Duration, _f: F) -> Result<R, StoreError>
    where
        F: FnMut(&mut WindowLog) -> R,
    {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    fn clear_namespace(&self, _namespace: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }
}

#[test]
fn test_check_then_record_flow() {
    init_logging();
    let clock = manual_clock();
    let gate = gate(&clock);

    for expected_in_window in 0..2 {
        let decision = gate.can_vote_for_option(5);
        assert!(decision.allowed);
        assert_eq!(decision.votes_in_window, expected_in_window);
        assert!(gate.record_valid_vote(5));
        clock.advance(Duration::from_secs(1));
    }

    let decision = gate.can_vote_for_option(5);
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenialReason::TwoVotesPerMinutePerOption));
    assert_eq!(decision.remaining_seconds, 58);
    assert!(decision.message().unwrap().contains("58 seconds"));
}

#[test]
fn test_window_boundary_is_inclusive() {
    let clock = manual_clock();
    let gate = gate(&clock);
    gate.record_valid_vote(1);
    gate.record_valid_vote(1);

    // Exactly one window later the votes still count
    clock.advance(Duration::from_secs(60));
    let decision = gate.can_vote_for_option(1);
    assert!(!decision.allowed);
    assert_eq!(decision.remaining_seconds, 0);

    clock.advance(Duration::from_secs(1));
    assert!(gate.can_vote_for_option(1).allowed);
}

#[test]
fn test_sliding_window_frees_one_slot_at_a_time() {
    let clock = manual_clock();
    let gate = gate(&clock);

    assert!(gate.admit(9).allowed);
    clock.advance(Duration::from_secs(30));
    assert!(gate.admit(9).allowed);
    clock.advance(Duration::from_secs(31));

    // The first vote left the window, the second has not
    let decision = gate.admit(9);
    assert!(decision.allowed);
    assert_eq!(decision.votes_in_window, 1);
    assert!(!gate.admit(9).allowed);
}

#[test]
fn test_store_entries_expire_after_twice_the_window() {
    let clock = manual_clock();
    let store = Arc::new(ShardedCounterStore::with_clock(Arc::new(clock.clone())));
    let gate = RateLimiterGate::builder()
        .with_clock(Arc::new(clock.clone()))
        .build_with_store(Arc::clone(&store))
        .unwrap();

    gate.record_valid_vote(3);
    assert!(store.get("rate:option:3").unwrap().is_some());

    clock.advance(Duration::from_secs(120));
    assert!(store.get("rate:option:3").unwrap().is_none());
    assert!(store.is_empty());
}

#[test]
fn test_idle_options_do_not_accumulate() {
    let clock = manual_clock();
    let store = Arc::new(ShardedCounterStore::with_clock(Arc::new(clock.clone())));
    let gate = RateLimiterGate::builder()
        .with_clock(Arc::new(clock.clone()))
        .build_with_store(Arc::clone(&store))
        .unwrap();

    for option in 0..1000 {
        gate.record_valid_vote(option);
    }
    assert_eq!(store.len(), 1000);

    clock.advance(Duration::from_secs(3600));
    for option in 0..1000 {
        assert!(gate.can_vote_for_option(option).allowed);
        assert!(!gate.option_stats(option).has_recent_votes);
    }

    assert!(store.is_empty());
}

#[test]
fn test_concurrent_check_and_record_never_exceeds_quota() {
    init_logging();
    let clock = manual_clock();
    let gate = Arc::new(gate(&clock));
    let threads = 32;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                gate.can_vote_for_option(77).allowed && gate.record_valid_vote(77)
            })
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|&accepted| accepted)
        .count();

    assert_eq!(accepted, 2);
    assert_eq!(gate.registry().load(77).unwrap().0.len(), 2);
    assert_eq!(gate.metrics().votes_admitted(), 2);
}

#[test]
fn test_concurrent_admit_across_options() {
    let clock = manual_clock();
    let gate = Arc::new(gate(&clock));
    let barrier = Arc::new(Barrier::new(40));

    let handles: Vec<_> = (0..40u64)
        .map(|i| {
            let gate = Arc::clone(&gate);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (i % 4, gate.admit(i % 4).allowed)
            })
        })
        .collect();

    let mut accepted = [0usize; 4];
    for handle in handles {
        let (option, allowed) = handle.join().unwrap();
        if allowed {
            accepted[option as usize] += 1;
        }
    }

    assert_eq!(accepted, [2, 2, 2, 2]);
}

#[test]
fn test_store_failure_fails_closed() {
    init_logging();
    let metrics = GateMetrics::new();
    let gate = RateLimiterGate::builder()
        .with_metrics(metrics.clone())
        .with_mode(ExecutionMode::NonProduction)
        .build_with_store(UnreachableStore)
        .unwrap();

    let decision = gate.can_vote_for_option(1);
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenialReason::CounterStoreUnavailable));

    // Stats agree with the fail-closed decision
    let stats = gate.option_stats(1);
    assert!(!stats.can_vote_now);
    assert_eq!(stats.slots_available, 0);

    assert!(!gate.record_valid_vote(1));
    assert!(!gate.admit(1).allowed);
    assert!(gate.clear_all_restrictions().is_err());

    assert_eq!(metrics.store_failures(), 4);
    assert_eq!(metrics.votes_admitted(), 0);
    // Only the record and admit steps count denials
    assert_eq!(metrics.votes_denied(), 2);
}

#[test]
fn test_option_stats_track_the_window() {
    let clock = manual_clock();
    let gate = gate(&clock);

    gate.record_valid_vote(2);
    clock.advance(Duration::from_secs(10));
    gate.record_valid_vote(2);

    let stats = gate.option_stats(2);
    assert!(stats.has_recent_votes);
    assert_eq!(stats.votes_in_window, 2);
    assert!(!stats.can_vote_now);
    assert_eq!(stats.remaining_seconds, 50);

    clock.advance(Duration::from_secs(100));
    let stats = gate.option_stats(2);
    assert_eq!(stats.votes_in_window, 0);
    assert!(stats.can_vote_now);
    assert_eq!(stats.slots_available, 2);
}

#[test]
fn test_decisions_serialize_with_snake_case_reason() {
    let clock = manual_clock();
    let gate = gate(&clock);
    gate.admit(1);
    gate.admit(1);

    let json = serde_json::to_value(gate.can_vote_for_option(1)).unwrap();
    assert_eq!(json["allowed"], false);
    assert_eq!(json["reason"], "two_votes_per_minute_per_option");
    assert_eq!(json["votes_in_window"], 2);
}
