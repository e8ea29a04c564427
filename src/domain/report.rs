//! Detection reports and their member projections.
//!
//! A [`DetectionReport`] is what report renderers and exporters consume. Members are
//! flattened into [`ClusterMember`] rows carrying everything a reviewer needs to
//! judge a token without going back to the store.

use crate::domain::bucket::{ClusterKind, MinuteKey};
use crate::domain::signature::AnswerSignature;
use crate::domain::usage::{SurveyId, TokenUsage, VoteEvent, PLACEHOLDER};
use ahash::AHashSet;
use serde::Serialize;

/// One vote of a clustered token, as shown in reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteDetail {
    /// Question text or `N/A`
    pub question: String,
    /// Option text or `N/A`
    pub answer: String,
    /// Whether the stored vote was counted
    pub is_valid: bool,
    /// Review status or `N/A`
    pub status: String,
    /// Fraud score (0 when never scored)
    pub fraud_score: f64,
}

impl From<&VoteEvent> for VoteDetail {
    fn from(vote: &VoteEvent) -> Self {
        Self {
            question: vote.question_label().to_string(),
            answer: vote.answer_label().to_string(),
            is_valid: vote.is_valid,
            status: vote.status.as_deref().unwrap_or(PLACEHOLDER).to_string(),
            fraud_score: vote.fraud_score.unwrap_or(0.0),
        }
    }
}

/// Source survey of a member in cross-survey reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyRef {
    /// Survey id
    pub survey_id: SurveyId,
    /// Survey title or `N/A`
    pub survey_title: String,
}

/// A clustered token usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMember {
    /// Token identifier
    pub token: String,
    /// Exact usage time, `YYYY-MM-DD HH:MM:SS`
    pub used_at: String,
    /// Fingerprint or `N/A`
    pub fingerprint: String,
    /// User agent or `N/A`
    pub user_agent: String,
    /// Source survey, only present in group reports
    #[serde(flatten)]
    pub survey: Option<SurveyRef>,
    /// Votes cast with the token
    pub votes: Vec<VoteDetail>,
}

impl ClusterMember {
    /// Project a usage into a report row.
    pub fn from_usage(usage: &TokenUsage, with_survey: bool) -> Self {
        let survey = with_survey.then(|| SurveyRef {
            survey_id: usage.survey_id,
            survey_title: usage
                .survey_title
                .clone()
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        });

        Self {
            token: usage.token.clone(),
            used_at: usage.format_used_at(),
            fingerprint: usage
                .fingerprint
                .clone()
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            user_agent: usage
                .user_agent
                .clone()
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            survey,
            votes: usage.votes.iter().map(VoteDetail::from).collect(),
        }
    }
}

/// Tokens inside one minute bucket that voted identically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SameMinuteCluster {
    /// Bucket the tokens were used in
    pub timestamp: MinuteKey,
    /// Number of tokens
    pub count: usize,
    /// Shared answer signature
    pub option_voted: AnswerSignature,
    /// Clustered tokens
    pub tokens: Vec<ClusterMember>,
}

/// Tokens from two nearby minute buckets that voted identically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjacentMinuteCluster {
    /// One or two minutes apart
    pub kind: ClusterKind,
    /// Earlier bucket
    pub timestamp_1: MinuteKey,
    /// Later bucket
    pub timestamp_2: MinuteKey,
    /// Shared answer signature
    pub option_voted: AnswerSignature,
    /// Members used in the earlier bucket
    pub tokens_at_time_1: Vec<ClusterMember>,
    /// Members used in the later bucket
    pub tokens_at_time_2: Vec<ClusterMember>,
    /// Members across both buckets
    pub total_count: usize,
}

impl AdjacentMinuteCluster {
    /// Members of both buckets, earlier bucket first.
    pub fn members(&self) -> impl Iterator<Item = &ClusterMember> {
        self.tokens_at_time_1.iter().chain(&self.tokens_at_time_2)
    }
}

/// Aggregate numbers of a detection pass.
///
/// The per-kind counts add up cluster sizes, so a token in several clusters is
/// counted in each of them; `total_suspicious` counts every token once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    /// Usages analysed
    pub total_tokens: usize,
    /// Members of same-minute clusters
    pub same_minute_count: usize,
    /// Members of one-minute clusters
    pub one_minute_count: usize,
    /// Members of two-minute clusters
    pub two_minute_count: usize,
    /// Distinct suspicious tokens
    pub total_suspicious: usize,
}

/// Result of a detection pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionReport {
    /// Same-minute clusters
    pub same_minute: Vec<SameMinuteCluster>,
    /// Clusters of buckets one minute apart
    pub one_minute_diff: Vec<AdjacentMinuteCluster>,
    /// Clusters of buckets two minutes apart
    pub two_minute_diff: Vec<AdjacentMinuteCluster>,
    /// Aggregate numbers
    pub summary: DetectionSummary,
}

impl DetectionReport {
    /// Every clustered member, in report order. May repeat tokens.
    pub fn members(&self) -> impl Iterator<Item = &ClusterMember> {
        let same = self.same_minute.iter().flat_map(|c| c.tokens.iter());
        let one = self.one_minute_diff.iter().flat_map(|c| c.members());
        let two = self.two_minute_diff.iter().flat_map(|c| c.members());
        same.chain(one).chain(two)
    }

    /// Distinct suspicious token ids, in order of first appearance.
    pub fn suspicious_tokens(&self) -> Vec<String> {
        let mut seen = AHashSet::new();
        self.members()
            .filter(|member| seen.insert(member.token.as_str()))
            .map(|member| member.token.clone())
            .collect()
    }

    /// Check if a token appears in any cluster.
    pub fn is_suspicious(&self, token: &str) -> bool {
        self.members().any(|member| member.token == token)
    }

    /// Total number of clusters of every kind.
    pub fn cluster_count(&self) -> usize {
        self.same_minute.len() + self.one_minute_diff.len() + self.two_minute_diff.len()
    }

    /// Check if no cluster was found.
    pub fn is_clean(&self) -> bool {
        self.cluster_count() == 0
    }
}
