//! In-memory usage source.
//!
//! Serves token usages from a vector, for replays of exported data and tests.

use crate::application::ports::{SourceError, UsageSource};
use crate::domain::usage::{SurveyId, TokenUsage};
use std::sync::{PoisonError, RwLock};

/// Usage source backed by an in-memory list.
///
/// Every stored usage is treated as a used token. Results are ordered by usage
/// time ascending; usages with the same time keep their insertion order.
#[derive(Debug, Default)]
pub struct InMemoryUsageSource {
    usages: RwLock<Vec<TokenUsage>>,
}

impl InMemoryUsageSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source holding `usages`.
    pub fn from_usages(usages: impl IntoIterator<Item = TokenUsage>) -> Self {
        Self {
            usages: RwLock::new(usages.into_iter().collect()),
        }
    }

    /// Add a usage.
    pub fn insert(&self, usage: TokenUsage) {
        self.usages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(usage);
    }

    /// Number of stored usages across all surveys.
    pub fn len(&self) -> usize {
        self.usages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the source is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UsageSource for InMemoryUsageSource {
    fn used_tokens(&self, surveys: &[SurveyId]) -> Result<Vec<TokenUsage>, SourceError> {
        let usages = self.usages.read().unwrap_or_else(PoisonError::into_inner);

        let mut selected: Vec<TokenUsage> = usages
            .iter()
            .filter(|usage| surveys.contains(&usage.survey_id))
            .cloned()
            .collect();
        selected.sort_by_key(|usage| usage.used_at);

        Ok(selected)
    }
}
