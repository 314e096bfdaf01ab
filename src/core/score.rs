//! Severity-weighted risk scoring.
//!
//! Both the score and the per-severity tally are pure functions of a finding
//! set; neither is ever stored apart from the findings it was derived from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{Finding, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    pub critical_weight: u32,
    pub high_weight: u32,
    pub medium_weight: u32,
    pub low_weight: u32,
    pub cap: u32,
    pub low_band_max: u32,
    pub medium_band_max: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            critical_weight: 10,
            high_weight: 5,
            medium_weight: 2,
            low_weight: 1,
            cap: 100,
            low_band_max: 20,
            medium_band_max: 50,
        }
    }
}

impl ScoringConfig {
    pub fn weight(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical_weight,
            Severity::High => self.high_weight,
            Severity::Medium => self.medium_weight,
            Severity::Low => self.low_weight,
            Severity::Info => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl StatusCounts {
    pub fn tally(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for f in findings {
            *counts.slot(f.severity) += 1;
        }
        counts
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    pub fn total(&self) -> usize {
        Severity::ALL.iter().map(|s| self.get(*s)).sum()
    }

    fn slot(&mut self, severity: Severity) -> &mut usize {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    /// Step function over the score: `<= low_band_max` is Low,
    /// `<= medium_band_max` is Medium, anything above is High.
    pub fn classify(score: u32, cfg: &ScoringConfig) -> Self {
        if score <= cfg.low_band_max {
            RiskBand::Low
        } else if score <= cfg.medium_band_max {
            RiskBand::Medium
        } else {
            RiskBand::High
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RiskBand::Low => "Low",
            RiskBand::Medium => "Medium",
            RiskBand::High => "High",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn risk_score(findings: &[Finding], cfg: &ScoringConfig) -> u32 {
    let counts = StatusCounts::tally(findings);
    let raw: u64 = Severity::ALL
        .iter()
        .map(|s| counts.get(*s) as u64 * u64::from(cfg.weight(*s)))
        .sum();
    raw.min(u64::from(cfg.cap)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DomainName;

    fn finding(severity: Severity) -> Finding {
        Finding::new(DomainName::IdentityAccess, "test.check", severity, "t")
    }

    fn findings(severities: &[Severity]) -> Vec<Finding> {
        severities.iter().map(|s| finding(*s)).collect()
    }

    #[test]
    fn critical_high_medium_scores_17_low_band() {
        let cfg = ScoringConfig::default();
        let mut set = findings(&[Severity::Critical, Severity::High, Severity::Medium]);
        let score = risk_score(&set, &cfg);
        assert_eq!(score, 17);
        assert_eq!(RiskBand::classify(score, &cfg), RiskBand::Low);

        set.push(finding(Severity::Critical));
        let score = risk_score(&set, &cfg);
        assert_eq!(score, 27);
        assert_eq!(RiskBand::classify(score, &cfg), RiskBand::Medium);
    }

    #[test]
    fn band_boundaries_are_exact() {
        let cfg = ScoringConfig::default();
        assert_eq!(RiskBand::classify(0, &cfg), RiskBand::Low);
        assert_eq!(RiskBand::classify(20, &cfg), RiskBand::Low);
        assert_eq!(RiskBand::classify(21, &cfg), RiskBand::Medium);
        assert_eq!(RiskBand::classify(50, &cfg), RiskBand::Medium);
        assert_eq!(RiskBand::classify(51, &cfg), RiskBand::High);
        assert_eq!(RiskBand::classify(100, &cfg), RiskBand::High);
    }

    #[test]
    fn score_is_capped() {
        let cfg = ScoringConfig::default();
        let set = findings(&[Severity::Critical; 12]);
        assert_eq!(risk_score(&set, &cfg), 100);
    }

    #[test]
    fn info_findings_do_not_score() {
        let cfg = ScoringConfig::default();
        let set = findings(&[Severity::Info, Severity::Info]);
        assert_eq!(risk_score(&set, &cfg), 0);
        assert_eq!(StatusCounts::tally(&set).info, 2);
    }

    #[test]
    fn score_and_counts_ignore_order_and_are_repeatable() {
        let cfg = ScoringConfig::default();
        let set = findings(&[
            Severity::Low,
            Severity::Critical,
            Severity::Info,
            Severity::Medium,
            Severity::High,
            Severity::Low,
        ]);
        let mut reversed = set.clone();
        reversed.reverse();

        assert_eq!(risk_score(&set, &cfg), risk_score(&set, &cfg));
        assert_eq!(risk_score(&set, &cfg), risk_score(&reversed, &cfg));
        assert_eq!(StatusCounts::tally(&set), StatusCounts::tally(&reversed));
        assert_eq!(StatusCounts::tally(&set).total(), set.len());
    }

    #[test]
    fn adding_never_decreases_and_removing_never_increases() {
        let cfg = ScoringConfig::default();
        let mut set = Vec::new();
        let mut prev = risk_score(&set, &cfg);
        for round in 0..15 {
            set.push(finding(Severity::ALL[round % Severity::ALL.len()]));
            let next = risk_score(&set, &cfg);
            assert!(next >= prev, "score dropped after adding: {prev} -> {next}");
            prev = next;
        }
        while set.pop().is_some() {
            let next = risk_score(&set, &cfg);
            assert!(next <= prev, "score rose after removing: {prev} -> {next}");
            prev = next;
        }
        assert_eq!(prev, 0);
    }

    #[test]
    fn custom_thresholds_are_honoured() {
        let cfg = ScoringConfig {
            low_band_max: 5,
            medium_band_max: 10,
            ..ScoringConfig::default()
        };
        assert_eq!(RiskBand::classify(6, &cfg), RiskBand::Medium);
        assert_eq!(RiskBand::classify(11, &cfg), RiskBand::High);
    }
}
