use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::score::{RiskBand, ScoringConfig, StatusCounts, risk_score};
use crate::core::{DomainName, Finding};

/// Check id carried by the synthetic finding that marks a deadline breach.
pub const RUN_TRUNCATED_CHECK_ID: &str = "engine.run-truncated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSummary {
    pub domain: DomainName,
    pub checks_run: usize,
    pub failed_checks: Vec<String>,
    pub warnings: Vec<String>,
    pub findings: usize,
}

/// Mutable half of an assessment run. Only the engine holds one, and it can
/// only append.
#[derive(Debug)]
pub struct RunBuilder {
    start_time: OffsetDateTime,
    domains_requested: Vec<DomainName>,
    domains_excluded: Vec<DomainName>,
    domain_summaries: Vec<DomainSummary>,
    findings: Vec<Finding>,
    truncated: bool,
    scoring: ScoringConfig,
}

impl RunBuilder {
    pub fn start(
        domains_requested: Vec<DomainName>,
        domains_excluded: Vec<DomainName>,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            start_time: OffsetDateTime::now_utc(),
            domains_requested,
            domains_excluded,
            domain_summaries: Vec::new(),
            findings: Vec::new(),
            truncated: false,
            scoring,
        }
    }

    pub fn append(&mut self, summary: DomainSummary, findings: Vec<Finding>) {
        self.domain_summaries.push(summary);
        self.findings.extend(findings);
    }

    pub fn mark_truncated(&mut self, annotation: Finding) {
        self.truncated = true;
        self.findings.push(annotation);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn freeze(self) -> AssessmentRun {
        AssessmentRun {
            start_time: self.start_time,
            end_time: OffsetDateTime::now_utc(),
            domains_requested: self.domains_requested,
            domains_excluded: self.domains_excluded,
            domain_summaries: self.domain_summaries,
            findings: self.findings,
            truncated: self.truncated,
            scoring: self.scoring,
        }
    }
}

/// Frozen output of one engine invocation. Score, band and counts are derived
/// from `findings` on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRun {
    #[serde(with = "time::serde::rfc3339")]
    start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    end_time: OffsetDateTime,
    domains_requested: Vec<DomainName>,
    #[serde(default)]
    domains_excluded: Vec<DomainName>,
    #[serde(default)]
    domain_summaries: Vec<DomainSummary>,
    findings: Vec<Finding>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    scoring: ScoringConfig,
}

impl AssessmentRun {
    pub fn start_time(&self) -> OffsetDateTime {
        self.start_time
    }

    pub fn end_time(&self) -> OffsetDateTime {
        self.end_time
    }

    pub fn duration(&self) -> time::Duration {
        self.end_time - self.start_time
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration().as_seconds_f64().max(0.0)
    }

    pub fn domains_requested(&self) -> &[DomainName] {
        &self.domains_requested
    }

    pub fn domains_excluded(&self) -> &[DomainName] {
        &self.domains_excluded
    }

    pub fn domain_summaries(&self) -> &[DomainSummary] {
        &self.domain_summaries
    }

    /// Findings in execution order.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    pub fn risk_score(&self) -> u32 {
        risk_score(&self.findings, &self.scoring)
    }

    pub fn risk_band(&self) -> RiskBand {
        RiskBand::classify(self.risk_score(), &self.scoring)
    }

    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.findings)
    }

    pub fn failed_check_count(&self) -> usize {
        self.domain_summaries
            .iter()
            .map(|d| d.failed_checks.len())
            .sum()
    }

    /// Findings ordered Critical → Info; equal severities keep execution order.
    pub fn presentation_order(&self) -> Vec<&Finding> {
        let mut ordered: Vec<&Finding> = self.findings.iter().collect();
        ordered.sort_by_key(|f| f.severity);
        ordered
    }

    /// A deadline breach that gathered nothing beyond its own annotation.
    pub fn truncated_without_findings(&self) -> bool {
        self.truncated
            && self
                .findings
                .iter()
                .all(|f| f.check_id == RUN_TRUNCATED_CHECK_ID)
    }
}
