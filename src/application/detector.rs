//! Temporal cluster detection.
//!
//! Flags groups of tokens that were used close together in time and voted
//! identically. Usages are bucketed by minute; tokens sharing an answer
//! signature inside one bucket form a same-minute cluster, and tokens sharing
//! a signature across two buckets one or two minutes apart form an adjacent
//! cluster.
//!
//! The detector is pure: it never mutates its input, holds no state between
//! calls and returns identical reports for identical input.

use crate::domain::bucket::{ClusterKind, MinuteKey};
use crate::domain::report::{
    AdjacentMinuteCluster, ClusterMember, DetectionReport, DetectionSummary, SameMinuteCluster,
};
use crate::domain::signature::{AnswerSignature, QuestionOrder};
use crate::domain::usage::TokenUsage;
use ahash::AHashMap;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Which pairs of minute buckets are compared for adjacent clusters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AdjacencyMode {
    /// Compare each occupied bucket only with the next occupied bucket.
    ///
    /// With buckets at minutes 0, 1 and 2, the 0/2 pair is never compared because
    /// minute 1 sits between them.
    #[default]
    AdjacentOccupied,
    /// Compare every pair of occupied buckets one or two minutes apart.
    WithinTwoMinutes,
}

/// How tokens that cast no votes take part in clustering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EmptySignaturePolicy {
    /// Empty signatures are compared like any other, so vote-less tokens used
    /// close together cluster with each other.
    #[default]
    Include,
    /// Vote-less tokens never join a cluster. They still count towards
    /// `total_tokens`.
    Exclude,
}

/// Configuration for a [`TemporalClusterDetector`].
#[derive(Debug, Clone, Default)]
pub struct DetectorConfig {
    /// Bucket pairing rule
    pub adjacency: AdjacencyMode,
    /// Handling of vote-less tokens
    pub empty_signatures: EmptySignaturePolicy,
    /// Question order for signatures; store order when absent
    pub question_order: Option<QuestionOrder>,
}

/// Builder for constructing a [`TemporalClusterDetector`].
#[derive(Debug, Default)]
pub struct TemporalClusterDetectorBuilder {
    config: DetectorConfig,
}

impl TemporalClusterDetectorBuilder {
    /// Set the bucket pairing rule.
    pub fn with_adjacency(mut self, adjacency: AdjacencyMode) -> Self {
        self.config.adjacency = adjacency;
        self
    }

    /// Set how vote-less tokens are handled.
    pub fn with_empty_signatures(mut self, policy: EmptySignaturePolicy) -> Self {
        self.config.empty_signatures = policy;
        self
    }

    /// Build signatures in a fixed question order.
    pub fn with_question_order(mut self, order: QuestionOrder) -> Self {
        self.config.question_order = Some(order);
        self
    }

    /// Build the detector.
    pub fn build(self) -> TemporalClusterDetector {
        TemporalClusterDetector {
            config: self.config,
        }
    }
}

/// A usage with its derived grouping keys.
#[derive(Debug)]
struct Signed<'a> {
    usage: &'a TokenUsage,
    signature: AnswerSignature,
    minute: MinuteKey,
}

/// Usages sharing one signature, in input order.
type SignatureGroup<'a, 'b> = (AnswerSignature, Vec<&'b Signed<'a>>);

/// Subgroup `members` by signature, keeping first-appearance order for both the
/// groups and the members inside each group.
fn group_by_signature<'a, 'b>(
    members: impl IntoIterator<Item = &'b Signed<'a>>,
) -> Vec<SignatureGroup<'a, 'b>>
where
    'a: 'b,
{
    let mut index: AHashMap<&'b AnswerSignature, usize> = AHashMap::new();
    let mut groups: Vec<SignatureGroup<'a, 'b>> = Vec::new();

    for member in members {
        match index.get(&member.signature) {
            Some(&position) => groups[position].1.push(member),
            None => {
                index.insert(&member.signature, groups.len());
                groups.push((member.signature.clone(), vec![member]));
            }
        }
    }

    groups
}

fn project(members: &[&Signed<'_>], with_survey: bool) -> Vec<ClusterMember> {
    members
        .iter()
        .map(|m| ClusterMember::from_usage(m.usage, with_survey))
        .collect()
}

/// Detects clusters of tokens used close together with identical answers.
#[derive(Debug, Clone, Default)]
pub struct TemporalClusterDetector {
    config: DetectorConfig,
}

impl TemporalClusterDetector {
    /// Create a detector with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder.
    pub fn builder() -> TemporalClusterDetectorBuilder {
        TemporalClusterDetectorBuilder::default()
    }

    /// Active configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyse the used tokens of one survey.
    pub fn detect(&self, usages: &[TokenUsage]) -> DetectionReport {
        self.run(usages, false)
    }

    /// Analyse the used tokens of several surveys at once.
    ///
    /// Same rules as [`detect`](Self::detect); every reported member additionally
    /// carries the survey it belongs to.
    pub fn detect_group(&self, usages: &[TokenUsage]) -> DetectionReport {
        self.run(usages, true)
    }

    /// Distinct suspicious token ids, in order of first appearance in the report.
    pub fn suspicious_tokens(&self, usages: &[TokenUsage]) -> Vec<String> {
        self.detect(usages).suspicious_tokens()
    }

    fn run(&self, usages: &[TokenUsage], with_survey: bool) -> DetectionReport {
        let buckets = self.bucket(usages);
        let keys: Vec<MinuteKey> = buckets.keys().copied().collect();

        let same_minute: Vec<SameMinuteCluster> = buckets
            .iter()
            .flat_map(|(minute, members)| Self::same_minute_clusters(*minute, members, with_survey))
            .collect();

        let mut one_minute_diff = Vec::new();
        let mut two_minute_diff = Vec::new();
        for (earlier, later) in self.bucket_pairs(&keys) {
            let Some(kind) = ClusterKind::for_gap(earlier.minutes_until(later)) else {
                continue;
            };
            let target = match kind {
                ClusterKind::OneMinuteDiff => &mut one_minute_diff,
                ClusterKind::TwoMinuteDiff => &mut two_minute_diff,
                ClusterKind::SameMinute => continue,
            };

            let merged = buckets
                .get(&earlier)
                .into_iter()
                .flatten()
                .chain(buckets.get(&later).into_iter().flatten());
            target.extend(Self::adjacent_clusters(kind, earlier, later, merged, with_survey));
        }

        let mut report = DetectionReport {
            summary: DetectionSummary {
                total_tokens: usages.len(),
                same_minute_count: same_minute.iter().map(|c| c.count).sum(),
                one_minute_count: one_minute_diff.iter().map(|c| c.total_count).sum(),
                two_minute_count: two_minute_diff.iter().map(|c| c.total_count).sum(),
                total_suspicious: 0,
            },
            same_minute,
            one_minute_diff,
            two_minute_diff,
        };
        report.summary.total_suspicious = report.suspicious_tokens().len();

        info!(
            total_tokens = report.summary.total_tokens,
            same_minute = report.same_minute.len(),
            one_minute = report.one_minute_diff.len(),
            two_minute = report.two_minute_diff.len(),
            total_suspicious = report.summary.total_suspicious,
            "Temporal cluster detection finished"
        );

        report
    }

    /// Partition usages into minute buckets, preserving input order inside each.
    fn bucket<'a>(&self, usages: &'a [TokenUsage]) -> BTreeMap<MinuteKey, Vec<Signed<'a>>> {
        let order = self.config.question_order.as_ref();
        let mut buckets: BTreeMap<MinuteKey, Vec<Signed<'a>>> = BTreeMap::new();

        for usage in usages {
            let signature = AnswerSignature::of(usage, order);
            if signature.is_empty() && self.config.empty_signatures == EmptySignaturePolicy::Exclude {
                debug!(token = %usage.token, "Skipping token without votes");
                continue;
            }

            let minute = MinuteKey::of(usage.used_at);
            buckets.entry(minute).or_default().push(Signed {
                usage,
                signature,
                minute,
            });
        }

        buckets
    }

    /// Pairs of occupied buckets to compare, earlier key first.
    fn bucket_pairs(&self, keys: &[MinuteKey]) -> Vec<(MinuteKey, MinuteKey)> {
        match self.config.adjacency {
            AdjacencyMode::AdjacentOccupied => {
                keys.windows(2).map(|pair| (pair[0], pair[1])).collect()
            }
            AdjacencyMode::WithinTwoMinutes => keys
                .iter()
                .enumerate()
                .flat_map(move |(i, &earlier)| {
                    keys[i + 1..]
                        .iter()
                        .take_while(move |&&later| earlier.minutes_until(later) <= 2)
                        .map(move |&later| (earlier, later))
                })
                .collect(),
        }
    }

    fn same_minute_clusters(
        minute: MinuteKey,
        members: &[Signed<'_>],
        with_survey: bool,
    ) -> Vec<SameMinuteCluster> {
        if members.len() < 2 {
            return Vec::new();
        }

        group_by_signature(members)
            .into_iter()
            .filter(|(_, group)| group.len() >= 2)
            .map(|(signature, group)| SameMinuteCluster {
                timestamp: minute,
                count: group.len(),
                option_voted: signature,
                tokens: project(&group, with_survey),
            })
            .collect()
    }

    /// Clusters over the merged members of two buckets.
    ///
    /// A cluster may draw all its members from one of the two buckets; the other
    /// side is then empty.
    fn adjacent_clusters<'a, 'b>(
        kind: ClusterKind,
        earlier: MinuteKey,
        later: MinuteKey,
        merged: impl IntoIterator<Item = &'b Signed<'a>>,
        with_survey: bool,
    ) -> Vec<AdjacentMinuteCluster>
    where
        'a: 'b,
    {
        group_by_signature(merged)
            .into_iter()
            .filter(|(_, group)| group.len() >= 2)
            .map(|(signature, group)| {
                let total_count = group.len();
                let (first, second): (Vec<_>, Vec<_>) =
                    group.into_iter().partition(|m| m.minute == earlier);

                AdjacentMinuteCluster {
                    kind,
                    timestamp_1: earlier,
                    timestamp_2: later,
                    option_voted: signature,
                    total_count,
                    tokens_at_time_1: project(&first, with_survey),
                    tokens_at_time_2: project(&second, with_survey),
                }
            })
            .collect()
    }
}
