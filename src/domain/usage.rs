//! Token usage records supplied by the vote store.
//!
//! A [`TokenUsage`] is the read-only record of one voting token being consumed:
//! when it was used, from which device, in which survey and with which answers.
//! Nothing in this crate mutates these records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identifier of an answer option.
pub type OptionId = u64;

/// Identifier of a survey question.
pub type QuestionId = u64;

/// Identifier of a survey.
pub type SurveyId = u64;

/// Marker substituted for any reference or label missing from a record.
pub const PLACEHOLDER: &str = "N/A";

/// A single answer cast by a token.
///
/// Question and option references are optional: a vote whose question or option row
/// was removed still shows up in the batch and is rendered with [`PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteEvent {
    /// Question answered (None when the question row is missing)
    pub question_id: Option<QuestionId>,
    /// Option chosen (None when the option row is missing)
    pub option_id: Option<OptionId>,
    /// When the vote was cast
    pub cast_at: NaiveDateTime,
    /// Question text for reports
    pub question_text: Option<String>,
    /// Option text for reports
    pub option_text: Option<String>,
    /// Whether the vote was counted when it was stored
    pub is_valid: bool,
    /// Review status of the stored vote (e.g. "approved", "pending_review")
    pub status: Option<String>,
    /// Fraud score assigned at submission time
    pub fraud_score: Option<f64>,
}

impl VoteEvent {
    /// Create a vote for `option_id` on `question_id`.
    pub fn new(question_id: QuestionId, option_id: OptionId, cast_at: NaiveDateTime) -> Self {
        Self {
            question_id: Some(question_id),
            option_id: Some(option_id),
            cast_at,
            question_text: None,
            option_text: None,
            is_valid: true,
            status: None,
            fraud_score: None,
        }
    }

    /// Create a vote whose question and option references are missing.
    pub fn orphaned(cast_at: NaiveDateTime) -> Self {
        Self {
            question_id: None,
            option_id: None,
            cast_at,
            question_text: None,
            option_text: None,
            is_valid: false,
            status: None,
            fraud_score: None,
        }
    }

    /// Attach the question and option texts shown in reports.
    pub fn with_labels(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.question_text = Some(question.into());
        self.option_text = Some(answer.into());
        self
    }

    /// Attach the review state recorded for the stored vote.
    pub fn with_review(mut self, is_valid: bool, status: impl Into<String>, fraud_score: f64) -> Self {
        self.is_valid = is_valid;
        self.status = Some(status.into());
        self.fraud_score = Some(fraud_score);
        self
    }

    /// Question text, or [`PLACEHOLDER`].
    pub fn question_label(&self) -> &str {
        self.question_text.as_deref().unwrap_or(PLACEHOLDER)
    }

    /// Option text, or [`PLACEHOLDER`].
    pub fn answer_label(&self) -> &str {
        self.option_text.as_deref().unwrap_or(PLACEHOLDER)
    }
}

/// The consumption of one voting token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Token identifier
    pub token: String,
    /// When the token was used (second resolution)
    pub used_at: NaiveDateTime,
    /// Browser fingerprint of the voter, if captured
    pub fingerprint: Option<String>,
    /// User agent of the voter, if captured
    pub user_agent: Option<String>,
    /// Survey the token belongs to
    pub survey_id: SurveyId,
    /// Survey title, used by cross-survey reports
    pub survey_title: Option<String>,
    /// Votes cast with this token, one per answered question
    pub votes: Vec<VoteEvent>,
}

impl TokenUsage {
    /// Create a usage record without votes.
    pub fn new(token: impl Into<String>, survey_id: SurveyId, used_at: NaiveDateTime) -> Self {
        Self {
            token: token.into(),
            used_at,
            fingerprint: None,
            user_agent: None,
            survey_id,
            survey_title: None,
            votes: Vec::new(),
        }
    }

    /// Append a vote cast with this token.
    pub fn with_vote(mut self, vote: VoteEvent) -> Self {
        self.votes.push(vote);
        self
    }

    /// Append a vote for `option_id` on `question_id`, cast when the token was used.
    pub fn with_answer(self, question_id: QuestionId, option_id: OptionId) -> Self {
        let cast_at = self.used_at;
        self.with_vote(VoteEvent::new(question_id, option_id, cast_at))
    }

    /// Set the browser fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the survey title.
    pub fn with_survey_title(mut self, title: impl Into<String>) -> Self {
        self.survey_title = Some(title.into());
        self
    }

    /// Whether the token was used without casting any vote.
    pub fn has_no_votes(&self) -> bool {
        self.votes.is_empty()
    }

    /// Usage time formatted as `YYYY-MM-DD HH:MM:SS`.
    pub fn format_used_at(&self) -> String {
        self.used_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 23)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_with_answer_uses_token_time() {
        let usage = TokenUsage::new("tok-1", 1, at(13, 1, 5)).with_answer(3, 7);

        assert_eq!(usage.votes.len(), 1);
        assert_eq!(usage.votes[0].question_id, Some(3));
        assert_eq!(usage.votes[0].option_id, Some(7));
        assert_eq!(usage.votes[0].cast_at, at(13, 1, 5));
    }

    #[test]
    fn test_labels_fall_back_to_placeholder() {
        let vote = VoteEvent::orphaned(at(9, 0, 0));
        assert_eq!(vote.question_label(), "N/A");
        assert_eq!(vote.answer_label(), "N/A");

        let vote = VoteEvent::new(1, 2, at(9, 0, 0)).with_labels("Mayor?", "Alice");
        assert_eq!(vote.question_label(), "Mayor?");
        assert_eq!(vote.answer_label(), "Alice");
    }

    #[test]
    fn test_format_used_at() {
        let usage = TokenUsage::new("tok", 1, at(8, 5, 9));
        assert_eq!(usage.format_used_at(), "2025-10-23 08:05:09");
    }

    #[test]
    fn test_has_no_votes() {
        let usage = TokenUsage::new("tok", 1, at(8, 5, 9));
        assert!(usage.has_no_votes());
        assert!(!usage.with_answer(1, 1).has_no_votes());
    }
}
