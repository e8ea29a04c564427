//! Anti-fraud reporting over a usage source.
//!
//! Loads used tokens through the [`UsageSource`] port and runs the detector on
//! them: per-survey and cross-survey reports, suspicious token lists, and
//! "clean" usage sets that leave every suspicious token out.

use crate::application::detector::TemporalClusterDetector;
use crate::application::ports::{SourceError, UsageSource};
use crate::domain::report::DetectionReport;
use crate::domain::usage::{SurveyId, TokenUsage};
use ahash::AHashSet;
use tracing::{debug, info};

/// Usages with every suspicious token removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanExport {
    /// Usages kept, in source order
    pub usages: Vec<TokenUsage>,
    /// Suspicious token ids left out
    pub excluded_tokens: Vec<String>,
}

impl CleanExport {
    /// Number of tokens left out.
    pub fn excluded_count(&self) -> usize {
        self.excluded_tokens.len()
    }
}

/// Runs temporal cluster detection against stored token usages.
#[derive(Debug, Clone)]
pub struct AntiFraudService<Src> {
    source: Src,
    detector: TemporalClusterDetector,
}

impl<Src> AntiFraudService<Src>
where
    Src: UsageSource,
{
    /// Create a service with the default detector.
    pub fn new(source: Src) -> Self {
        Self::with_detector(source, TemporalClusterDetector::new())
    }

    /// Create a service with a custom detector.
    pub fn with_detector(source: Src, detector: TemporalClusterDetector) -> Self {
        Self { source, detector }
    }

    /// Access the detector.
    pub fn detector(&self) -> &TemporalClusterDetector {
        &self.detector
    }

    /// Detection report for one survey.
    pub fn survey_report(&self, survey: SurveyId) -> Result<DetectionReport, SourceError> {
        let usages = self.source.used_tokens(&[survey])?;
        debug!(survey, usages = usages.len(), "Loaded used tokens");
        Ok(self.detector.detect(&usages))
    }

    /// Detection report across several surveys analysed as one population.
    pub fn group_report(&self, surveys: &[SurveyId]) -> Result<DetectionReport, SourceError> {
        let usages = self.source.used_tokens(surveys)?;
        debug!(?surveys, usages = usages.len(), "Loaded used tokens for group");
        Ok(self.detector.detect_group(&usages))
    }

    /// Suspicious token ids of one survey.
    pub fn suspicious_tokens(&self, survey: SurveyId) -> Result<Vec<String>, SourceError> {
        Ok(self.survey_report(survey)?.suspicious_tokens())
    }

    /// Suspicious token ids across several surveys.
    pub fn suspicious_tokens_in_group(
        &self,
        surveys: &[SurveyId],
    ) -> Result<Vec<String>, SourceError> {
        Ok(self.group_report(surveys)?.suspicious_tokens())
    }

    /// Used tokens of one survey without the suspicious ones.
    pub fn clean_survey_export(&self, survey: SurveyId) -> Result<CleanExport, SourceError> {
        let usages = self.source.used_tokens(&[survey])?;
        let report = self.detector.detect(&usages);
        Ok(Self::exclude(usages, &report))
    }

    /// Used tokens of several surveys without the suspicious ones.
    pub fn clean_group_export(&self, surveys: &[SurveyId]) -> Result<CleanExport, SourceError> {
        let usages = self.source.used_tokens(surveys)?;
        let report = self.detector.detect_group(&usages);
        Ok(Self::exclude(usages, &report))
    }

    fn exclude(usages: Vec<TokenUsage>, report: &DetectionReport) -> CleanExport {
        let excluded_tokens = report.suspicious_tokens();
        let excluded: AHashSet<&str> = excluded_tokens.iter().map(String::as_str).collect();

        let usages: Vec<TokenUsage> = usages
            .into_iter()
            .filter(|usage| !excluded.contains(usage.token.as_str()))
            .collect();

        info!(
            kept = usages.len(),
            excluded = excluded_tokens.len(),
            "Built clean export"
        );

        CleanExport {
            usages,
            excluded_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::source::InMemoryUsageSource;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 23)
            .unwrap()
            .and_hms_opt(10, m, s)
            .unwrap()
    }

    fn source() -> InMemoryUsageSource {
        InMemoryUsageSource::from_usages([
            TokenUsage::new("a", 1, at(0, 5)).with_answer(1, 7),
            TokenUsage::new("b", 1, at(0, 45)).with_answer(1, 7),
            TokenUsage::new("c", 1, at(5, 0)).with_answer(1, 7),
            TokenUsage::new("d", 2, at(0, 30)).with_answer(9, 7),
        ])
    }

    struct FailingSource;

    impl UsageSource for FailingSource {
        fn used_tokens(&self, _surveys: &[SurveyId]) -> Result<Vec<TokenUsage>, SourceError> {
            Err(SourceError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_survey_report() {
        let service = AntiFraudService::new(source());
        let report = service.survey_report(1).unwrap();

        assert_eq!(report.summary.total_tokens, 3);
        assert_eq!(report.suspicious_tokens(), vec!["a", "b"]);
    }

    #[test]
    fn test_group_report_spans_surveys() {
        let service = AntiFraudService::new(source());
        let tokens = service.suspicious_tokens_in_group(&[1, 2]).unwrap();

        assert_eq!(tokens, vec!["a", "d", "b"]);
        let report = service.group_report(&[1, 2]).unwrap();
        assert!(report.same_minute[0].tokens[1].survey.is_some());
    }

    #[test]
    fn test_clean_export_excludes_suspicious_tokens() {
        let service = AntiFraudService::new(source());
        let export = service.clean_survey_export(1).unwrap();

        let kept: Vec<&str> = export.usages.iter().map(|u| u.token.as_str()).collect();
        assert_eq!(kept, vec!["c"]);
        assert_eq!(export.excluded_count(), 2);
    }

    #[test]
    fn test_source_errors_propagate() {
        let service = AntiFraudService::new(FailingSource);
        assert!(matches!(
            service.survey_report(1),
            Err(SourceError::Unavailable(_))
        ));
        assert!(service.clean_group_export(&[1, 2]).is_err());
    }
}
