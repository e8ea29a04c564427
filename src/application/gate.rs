//! Per-option vote gate.
//!
//! The gate caps how many votes per answer option count inside a rolling window
//! (2 per 60 seconds by default). A denied vote is still stored by the caller,
//! just flagged as not countable; the voter always sees success.
//!
//! The usual submission flow is [`RateLimiterGate::can_vote_for_option`] before
//! the vote is committed and [`RateLimiterGate::record_valid_vote`] after. Both
//! the record step and [`RateLimiterGate::admit`] re-check the cap inside the
//! store's atomic update, so concurrent submissions can never push an option
//! past its quota even if several of them saw "allowed" at check time.

use crate::application::metrics::GateMetrics;
use crate::application::ports::{Clock, CounterStore, StoreError};
use crate::application::registry::{WindowRegistry, DEFAULT_KEY_PREFIX};
use crate::domain::decision::{OptionStats, VoteDecision};
use crate::domain::usage::OptionId;
use crate::domain::window::WindowLog;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::ShardedCounterStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of countable votes per option inside the window.
pub const DEFAULT_MAX_VOTES: usize = 2;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Execution mode the gate was built for.
///
/// Test-isolation resets are refused in production mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Live traffic
    #[default]
    Production,
    /// Tests, staging and local development
    NonProduction,
}

/// Raised when an operation is not permitted in the gate's execution mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A test-only reset was invoked on a production gate.
    #[error("{operation} is only available outside production")]
    ResetInProduction {
        /// The refused operation
        operation: &'static str,
    },
}

/// Errors returned by the gate's administrative operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// The operation is not allowed in this execution mode.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The counter store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error returned when building a gate fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Maximum votes must be greater than zero
    #[error("max_votes must be greater than 0")]
    ZeroMaxVotes,
    /// The window must last at least one second
    #[error("window must be at least one second, got {0:?}")]
    WindowTooShort(Duration),
    /// The key prefix must not be empty
    #[error("key prefix must not be empty")]
    EmptyKeyPrefix,
}

/// Builder for constructing a [`RateLimiterGate`].
#[derive(Debug)]
pub struct RateLimiterGateBuilder {
    max_votes: usize,
    window: Duration,
    key_prefix: String,
    mode: ExecutionMode,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<GateMetrics>,
}

impl Default for RateLimiterGateBuilder {
    fn default() -> Self {
        Self {
            max_votes: DEFAULT_MAX_VOTES,
            window: DEFAULT_WINDOW,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            mode: ExecutionMode::default(),
            clock: None,
            metrics: None,
        }
    }
}

impl RateLimiterGateBuilder {
    /// Set the number of countable votes per option inside the window.
    pub fn with_max_votes(mut self, max_votes: usize) -> Self {
        self.max_votes = max_votes;
        self
    }

    /// Set the window length (whole seconds).
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set the key namespace in the counter store.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set a custom clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing metrics tracker.
    pub fn with_metrics(mut self, metrics: GateMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.max_votes == 0 {
            return Err(BuildError::ZeroMaxVotes);
        }
        if self.window.as_secs() == 0 {
            return Err(BuildError::WindowTooShort(self.window));
        }
        if self.key_prefix.is_empty() {
            return Err(BuildError::EmptyKeyPrefix);
        }
        Ok(())
    }

    /// Build a gate over an in-process sharded store.
    ///
    /// The store expires entries against the same clock as the gate.
    pub fn build(self) -> Result<RateLimiterGate<Arc<ShardedCounterStore>>, BuildError> {
        let clock = self
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let store = Arc::new(ShardedCounterStore::with_clock(clock));
        self.build_with_store(store)
    }

    /// Build a gate over a custom counter store.
    pub fn build_with_store<S>(self, store: S) -> Result<RateLimiterGate<S>, BuildError>
    where
        S: CounterStore,
    {
        self.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let registry = WindowRegistry::new(store, clock, self.key_prefix, self.window);

        Ok(RateLimiterGate {
            registry,
            max_votes: self.max_votes,
            mode: self.mode,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

/// Enforces "at most K countable votes per option per rolling window W".
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct RateLimiterGate<S>
where
    S: CounterStore,
{
    registry: WindowRegistry<S>,
    max_votes: usize,
    mode: ExecutionMode,
    metrics: GateMetrics,
}

impl RateLimiterGate<Arc<ShardedCounterStore>> {
    /// Create a production gate with default limits over an in-process store.
    pub fn in_memory() -> Self {
        let store = Arc::new(ShardedCounterStore::new());
        let registry = WindowRegistry::new(
            store,
            Arc::new(SystemClock::new()),
            DEFAULT_KEY_PREFIX.to_string(),
            DEFAULT_WINDOW,
        );
        Self {
            registry,
            max_votes: DEFAULT_MAX_VOTES,
            mode: ExecutionMode::Production,
            metrics: GateMetrics::new(),
        }
    }

    /// Create a builder.
    pub fn builder() -> RateLimiterGateBuilder {
        RateLimiterGateBuilder::default()
    }
}

impl<S> RateLimiterGate<S>
where
    S: CounterStore,
{
    /// Decide whether `option_id` may receive another countable vote.
    ///
    /// Read-only: stale timestamps are ignored for counting but left in the store.
    /// A store failure yields a denial with `CounterStoreUnavailable`. Denials are
    /// not counted in the metrics here; the record or admit step counts them.
    pub fn can_vote_for_option(&self, option_id: OptionId) -> VoteDecision {
        let decision = match self.registry.load(option_id) {
            Ok((log, now)) => self.evaluate(&log, now),
            Err(e) => return self.store_failure(option_id, "check", e),
        };

        if decision.is_denied() {
            debug!(
                option_id,
                votes_in_window = decision.votes_in_window,
                remaining_seconds = decision.remaining_seconds,
                "Option quota reached, vote will not count"
            );
        }

        decision
    }

    /// Record a vote the caller already decided is countable.
    ///
    /// Appends the current time to the option's log, prunes entries that left the
    /// window and persists the log with a TTL of twice the window. If concurrent
    /// submissions used up the quota since the caller's check, nothing is
    /// appended and `false` is returned: the vote must be stored as not countable.
    pub fn record_valid_vote(&self, option_id: OptionId) -> bool {
        let window = self.registry.window();
        let max_votes = self.max_votes;

        let recorded = self.registry.with_log(option_id, |log, now| {
            log.prune(now, window);
            if log.len() < max_votes {
                log.push(now);
                true
            } else {
                false
            }
        });

        match recorded {
            Ok(true) => {
                self.metrics.record_admitted();
                debug!(option_id, "Recorded countable vote");
                true
            }
            Ok(false) => {
                self.metrics.record_denied();
                debug!(option_id, "Quota used up concurrently, vote not recorded");
                false
            }
            Err(e) => {
                self.metrics.record_denied();
                self.store_failure(option_id, "record", e);
                false
            }
        }
    }

    /// Check and record in one atomic step.
    ///
    /// Equivalent to [`can_vote_for_option`](Self::can_vote_for_option) followed by
    /// [`record_valid_vote`](Self::record_valid_vote) with no window for another
    /// submission to slip in between.
    pub fn admit(&self, option_id: OptionId) -> VoteDecision {
        let window = self.registry.window();

        let decision = self.registry.with_log(option_id, |log, now| {
            log.prune(now, window);
            let decision = self.evaluate(log, now);
            if decision.allowed {
                log.push(now);
            }
            decision
        });

        match decision {
            Ok(decision) => {
                if decision.allowed {
                    self.metrics.record_admitted();
                } else {
                    self.metrics.record_denied();
                }
                debug!(
                    option_id,
                    allowed = decision.allowed,
                    votes_in_window = decision.votes_in_window,
                    "Vote admission decided"
                );
                decision
            }
            Err(e) => {
                self.metrics.record_denied();
                self.store_failure(option_id, "admit", e)
            }
        }
    }

    /// Diagnostic snapshot of an option's window. Read-only.
    ///
    /// When the store cannot be read the snapshot reports no free slot, matching
    /// the denial `can_vote_for_option` gives in that case.
    pub fn option_stats(&self, option_id: OptionId) -> OptionStats {
        let (log, now) = match self.registry.load(option_id) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.store_failure(option_id, "stats", e);
                return OptionStats::unavailable();
            }
        };

        if log.is_empty() {
            return OptionStats::idle(self.max_votes);
        }

        let decision = self.evaluate(&log, now);
        OptionStats {
            has_recent_votes: true,
            votes_in_window: decision.votes_in_window,
            can_vote_now: decision.allowed,
            slots_available: self.max_votes.saturating_sub(decision.votes_in_window),
            remaining_seconds: decision.remaining_seconds,
        }
    }

    /// Drop an option's log. Test isolation only.
    ///
    /// # Errors
    /// Fails with [`ConfigurationError`] on a production gate.
    pub fn clear_option_restriction(&self, option_id: OptionId) -> Result<(), GateError> {
        self.ensure_resettable("clear_option_restriction")?;
        self.registry.forget(option_id)?;
        Ok(())
    }

    /// Drop every option's log. Test isolation only.
    ///
    /// # Errors
    /// Fails with [`ConfigurationError`] on a production gate.
    pub fn clear_all_restrictions(&self) -> Result<(), GateError> {
        self.ensure_resettable("clear_all_restrictions")?;
        self.registry.clear()?;
        Ok(())
    }

    /// Countable votes per option inside the window.
    pub fn max_votes(&self) -> usize {
        self.max_votes
    }

    /// Length of the window.
    pub fn window(&self) -> Duration {
        self.registry.window()
    }

    /// Execution mode the gate was built for.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Admission metrics.
    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    /// Access the window registry.
    pub fn registry(&self) -> &WindowRegistry<S> {
        &self.registry
    }

    fn evaluate(&self, log: &WindowLog, now: i64) -> VoteDecision {
        let window = self.registry.window();
        let votes_in_window = log.count_within(now, window);

        if votes_in_window < self.max_votes {
            return VoteDecision::allow(votes_in_window);
        }

        let remaining_seconds = log
            .oldest_within(now, window)
            .map(|oldest| {
                let elapsed = now.saturating_sub(oldest).max(0).unsigned_abs();
                window.as_secs().saturating_sub(elapsed)
            })
            .unwrap_or(0);

        VoteDecision::quota_reached(votes_in_window, remaining_seconds)
    }

    fn store_failure(&self, option_id: OptionId, operation: &str, error: StoreError) -> VoteDecision {
        self.metrics.record_store_failure();
        warn!(
            option_id,
            operation,
            error = %error,
            "Counter store failed, vote treated as not countable"
        );
        VoteDecision::store_unavailable()
    }

    fn ensure_resettable(&self, operation: &'static str) -> Result<(), ConfigurationError> {
        match self.mode {
            ExecutionMode::NonProduction => Ok(()),
            ExecutionMode::Production => {
                warn!(operation, "Refused test-only reset on a production gate");
                Err(ConfigurationError::ResetInProduction { operation })
            }
        }
    }
}
