//! Answer signatures for ballot comparison.
//!
//! An answer signature identifies how a token voted: the chosen option of every
//! answered question, in a fixed question order, each followed by `_`.
//!
//! Tokens with identical signatures "voted the same way" and are candidates for
//! the same suspicion cluster. A token without votes has the empty signature,
//! which compares equal to every other empty signature.

use crate::domain::usage::{QuestionId, TokenUsage, VoteEvent, PLACEHOLDER};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator appended after each option id.
const SEGMENT_SEPARATOR: char = '_';

/// How a token voted, e.g. `"7_12_"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSignature(String);

impl AnswerSignature {
    /// Compute the signature of a token usage.
    ///
    /// Votes are taken in `order` when one is supplied, otherwise in the order the
    /// store returned them. A vote without an option reference contributes the
    /// placeholder segment `N/A_` instead of failing.
    pub fn of(usage: &TokenUsage, order: Option<&QuestionOrder>) -> Self {
        let mut votes: Vec<&VoteEvent> = usage.votes.iter().collect();
        if let Some(order) = order {
            // Stable sort keeps store order for questions the ordering doesn't know.
            votes.sort_by_key(|vote| order.rank(vote.question_id));
        }

        let mut key = String::with_capacity(votes.len() * 4);
        for vote in votes {
            match vote.option_id {
                Some(option_id) => key.push_str(&option_id.to_string()),
                None => key.push_str(PLACEHOLDER),
            }
            key.push(SEGMENT_SEPARATOR);
        }

        AnswerSignature(key)
    }

    /// Build a signature from its textual form.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        AnswerSignature(raw.into())
    }

    /// True for tokens that cast no votes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Textual form of the signature.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnswerSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed ordering of questions used when building signatures.
///
/// Questions missing from the ordering sort after every known question.
#[derive(Debug, Clone, Default)]
pub struct QuestionOrder {
    ranks: AHashMap<QuestionId, usize>,
}

impl QuestionOrder {
    /// Create an ordering from question ids listed first to last.
    pub fn new(questions: impl IntoIterator<Item = QuestionId>) -> Self {
        let mut ranks = AHashMap::new();
        for (rank, question) in questions.into_iter().enumerate() {
            ranks.entry(question).or_insert(rank);
        }
        Self { ranks }
    }

    /// Position of a question; unknown or missing questions rank last.
    pub fn rank(&self, question: Option<QuestionId>) -> usize {
        question
            .and_then(|q| self.ranks.get(&q).copied())
            .unwrap_or(usize::MAX)
    }

    /// Number of ordered questions.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// Check if the ordering is empty.
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

impl FromIterator<QuestionId> for QuestionOrder {
    fn from_iter<T: IntoIterator<Item = QuestionId>>(iter: T) -> Self {
        Self::new(iter)
    }
}
