use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::core::{AssessmentRun, Finding};
use crate::report::{ReportFormat, ReportRenderer, ReportWriteError};

pub const REFS_SEPARATOR: &str = "; ";

/// One CSV row per finding. No aggregate rows.
#[derive(Debug, Serialize)]
struct CsvFindingRecord<'a> {
    #[serde(rename = "Domain")]
    domain: &'a str,
    #[serde(rename = "Severity")]
    severity: &'a str,
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "Remediation")]
    remediation: &'a str,
    #[serde(rename = "ComplianceRefs")]
    compliance_refs: String,
    #[serde(rename = "Reference")]
    reference: &'a str,
    #[serde(rename = "CheckId")]
    check_id: &'a str,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

impl<'a> From<&'a Finding> for CsvFindingRecord<'a> {
    fn from(f: &'a Finding) -> Self {
        Self {
            domain: f.domain.display_name(),
            severity: f.severity.as_str(),
            title: &f.title,
            description: &f.description,
            remediation: &f.remediation,
            compliance_refs: f.compliance_refs.join(REFS_SEPARATOR),
            reference: f.reference.as_deref().unwrap_or(""),
            check_id: &f.check_id,
            timestamp: f.timestamp.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvRenderer;

impl ReportRenderer for CsvRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Csv
    }

    fn render(&self, run: &AssessmentRun) -> Result<Vec<u8>, ReportWriteError> {
        let mut wtr = ::csv::Writer::from_writer(Vec::new());
        if run.findings().is_empty() {
            // serialize() only emits the header alongside the first record.
            wtr.write_record(HEADERS).map_err(render_error)?;
        }
        for finding in run.findings() {
            wtr.serialize(CsvFindingRecord::from(finding))
                .map_err(render_error)?;
        }
        wtr.into_inner().map_err(render_error)
    }
}

fn render_error(e: impl std::fmt::Display) -> ReportWriteError {
    ReportWriteError::Render {
        format: ReportFormat::Csv,
        message: e.to_string(),
    }
}

const HEADERS: [&str; 9] = [
    "Domain",
    "Severity",
    "Title",
    "Description",
    "Remediation",
    "ComplianceRefs",
    "Reference",
    "CheckId",
    "Timestamp",
];
