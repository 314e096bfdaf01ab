use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{AssessmentRun, RiskBand, StatusCounts};
use crate::report::{ReportFormat, ReportRenderer, ReportWriteError};

pub const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub summary: ReportSummary,
    pub run: AssessmentRun,
}

/// Aggregates copied out of the run for consumers that do not want to
/// recompute them. The run itself stays the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub risk_score: u32,
    pub risk_band: RiskBand,
    pub status_counts: StatusCounts,
    pub total_findings: usize,
    pub failed_checks: usize,
    pub duration_seconds: f64,
    pub truncated: bool,
}

impl ReportDocument {
    pub fn new(run: &AssessmentRun) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| "unknown".to_string()),
            summary: ReportSummary {
                risk_score: run.risk_score(),
                risk_band: run.risk_band(),
                status_counts: run.status_counts(),
                total_findings: run.findings().len(),
                failed_checks: run.failed_check_count(),
                duration_seconds: run.duration_seconds(),
                truncated: run.truncated(),
            },
            run: run.clone(),
        }
    }
}

pub fn parse(bytes: &[u8]) -> Result<ReportDocument, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn render(&self, run: &AssessmentRun) -> Result<Vec<u8>, ReportWriteError> {
        let mut buf = serde_json::to_vec_pretty(&ReportDocument::new(run)).map_err(|e| {
            ReportWriteError::Render {
                format: ReportFormat::Json,
                message: e.to_string(),
            }
        })?;
        buf.push(b'\n');
        Ok(buf)
    }
}
