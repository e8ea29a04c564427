//! # ballot-guard
//!
//! Anti-fraud core for online voting: a per-option vote gate and a temporal
//! cluster detector.
//!
//! ## Quick Start
//!
//! ### Gating votes
//!
//! The gate caps how many votes per answer option count inside a rolling window.
//! By default an option accepts 2 countable votes per 60 seconds. A vote over the
//! cap is still stored, just flagged as not countable; the voter is never told.
//!
//! ```rust
//! use ballot_guard::RateLimiterGate;
//!
//! let gate = RateLimiterGate::builder().build().expect("valid config");
//!
//! let option_id = 42;
//! let decision = gate.can_vote_for_option(option_id);
//! let countable = decision.allowed && gate.record_valid_vote(option_id);
//! // Store the vote with `is_valid = countable`
//! assert!(countable);
//! ```
//!
//! When check and record happen at the same place, [`RateLimiterGate::admit`]
//! does both in one atomic step.
//!
//! ### Detecting clusters
//!
//! ```rust
//! use ballot_guard::{TemporalClusterDetector, TokenUsage};
//! use chrono::NaiveDate;
//!
//! let at = |s| NaiveDate::from_ymd_opt(2025, 10, 23).unwrap().and_hms_opt(10, 0, s).unwrap();
//! let usages = vec![
//!     TokenUsage::new("tok-a", 1, at(5)).with_answer(1, 7).with_answer(2, 12),
//!     TokenUsage::new("tok-b", 1, at(45)).with_answer(1, 7).with_answer(2, 12),
//! ];
//!
//! let report = TemporalClusterDetector::new().detect(&usages);
//! assert_eq!(report.same_minute.len(), 1);
//! assert_eq!(report.same_minute[0].option_voted.as_str(), "7_12_");
//! assert_eq!(report.suspicious_tokens(), vec!["tok-a", "tok-b"]);
//! ```
//!
//! ## Vote Gate
//!
//! Each option keeps a log of the unix seconds at which countable votes were
//! recorded. A vote is admitted while fewer than `max_votes` timestamps fall
//! inside `[now - window, now]`. Logs live in a [`CounterStore`] under
//! `rate:option:{option_id}` and expire after twice the window.
//!
//! - [`ShardedCounterStore`] keeps logs in-process (default)
//! - `RedisCounterStore` shares them between instances (feature `redis-storage`)
//!
//! Recording re-checks the cap inside the store's atomic update, so concurrent
//! submissions for one option never push it past its quota. Store failures are
//! logged and the vote is treated as not countable.
//!
//! Test-only resets (`clear_option_restriction`, `clear_all_restrictions`) are
//! refused unless the gate was built with [`ExecutionMode::NonProduction`].
//!
//! ## Temporal Cluster Detection
//!
//! Usages are bucketed by minute and compared by [`AnswerSignature`], the chosen
//! options of a ballot concatenated as `"7_12_"`. The detector reports:
//!
//! - **Same minute**: two or more tokens in one bucket with identical signatures
//! - **1 minute apart**: identical signatures across consecutive occupied buckets one minute apart
//! - **2 minutes apart**: the same for buckets two minutes apart
//!
//! [`AntiFraudService`] runs detection over a [`UsageSource`] and builds clean
//! exports without suspicious tokens.
//!
//! ## Observability
//!
//! The crate logs through `tracing` and never installs a subscriber. Gate
//! admission counts are available through [`RateLimiterGate::metrics`]:
//!
//! ```rust
//! # use ballot_guard::RateLimiterGate;
//! let gate = RateLimiterGate::in_memory();
//! gate.admit(1);
//!
//! let snapshot = gate.metrics().snapshot();
//! assert_eq!(snapshot.votes_admitted, 1);
//! assert_eq!(snapshot.denial_rate(), 0.0);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    bucket::{ClusterKind, MinuteKey},
    decision::{DenialReason, OptionStats, VoteDecision},
    report::{
        AdjacentMinuteCluster, ClusterMember, DetectionReport, DetectionSummary,
        SameMinuteCluster, SurveyRef, VoteDetail,
    },
    signature::{AnswerSignature, QuestionOrder},
    usage::{OptionId, QuestionId, SurveyId, TokenUsage, VoteEvent, PLACEHOLDER},
    window::WindowLog,
};

pub use application::{
    detector::{
        AdjacencyMode, DetectorConfig, EmptySignaturePolicy, TemporalClusterDetector,
        TemporalClusterDetectorBuilder,
    },
    gate::{
        BuildError, ConfigurationError, ExecutionMode, GateError, RateLimiterGate,
        RateLimiterGateBuilder, DEFAULT_MAX_VOTES, DEFAULT_WINDOW,
    },
    metrics::{GateMetrics, GateMetricsSnapshot},
    ports::{Clock, CounterStore, SourceError, StoreError, UsageSource},
    registry::{WindowRegistry, DEFAULT_KEY_PREFIX},
    service::{AntiFraudService, CleanExport},
};

pub use infrastructure::{
    clock::{ManualClock, SystemClock},
    source::InMemoryUsageSource,
    storage::ShardedCounterStore,
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisCounterStore, RedisCounterStoreConfig};
