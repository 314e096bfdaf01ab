//! Report generation.
//!
//! Renderers only read a frozen [`AssessmentRun`]; [`write_reports`] turns each
//! requested format into a timestamped, write-once file. A failing format is
//! recorded and the remaining formats are still attempted.

pub mod csv;
pub mod html;
pub mod json;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::core::AssessmentRun;

pub const DEFAULT_REPORT_NAME: &str = "TenantSecurityAssessment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Csv,
    Json,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [ReportFormat::Html, ReportFormat::Csv, ReportFormat::Json];

    pub const fn extension(self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }

    fn renderer(self) -> &'static dyn ReportRenderer {
        match self {
            ReportFormat::Html => &html::HtmlRenderer,
            ReportFormat::Csv => &csv::CsvRenderer,
            ReportFormat::Json => &json::JsonRenderer,
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Which formats a caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatSelector {
    Html,
    Csv,
    Json,
    #[default]
    All,
}

impl FormatSelector {
    pub fn formats(self) -> Vec<ReportFormat> {
        match self {
            FormatSelector::Html => vec![ReportFormat::Html],
            FormatSelector::Csv => vec![ReportFormat::Csv],
            FormatSelector::Json => vec![ReportFormat::Json],
            FormatSelector::All => ReportFormat::ALL.to_vec(),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FormatSelector::Html => "html",
            FormatSelector::Csv => "csv",
            FormatSelector::Json => "json",
            FormatSelector::All => "all",
        }
    }
}

impl fmt::Display for FormatSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(FormatSelector::Html),
            "csv" => Ok(FormatSelector::Csv),
            "json" => Ok(FormatSelector::Json),
            "all" => Ok(FormatSelector::All),
            other => Err(format!(
                "unknown report format: {other} (expected html, csv, json or all)"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportWriteError {
    #[error("failed to render {format} report: {message}")]
    Render {
        format: ReportFormat,
        message: String,
    },
    #[error("{format} report not written: {} already exists", path.display())]
    AlreadyExists { format: ReportFormat, path: PathBuf },
    #[error("failed to write {format} report to {}: {source}", path.display())]
    Io {
        format: ReportFormat,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no report could be written: {}", join_errors(failures))]
    NothingWritten { failures: Vec<ReportWriteError> },
}

fn join_errors(errors: &[ReportWriteError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Turns a run into the bytes of one output format.
pub trait ReportRenderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    fn render(&self, run: &AssessmentRun) -> Result<Vec<u8>, ReportWriteError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrittenReport {
    pub format: ReportFormat,
    pub path: PathBuf,
    pub bytes: usize,
}

#[derive(Debug, Default)]
pub struct ReportOutcome {
    pub written: Vec<WrittenReport>,
    pub failures: Vec<ReportWriteError>,
}

/// `<name>_<yyyyMMdd_HHmmss>.<ext>`, stamped with the run start time in UTC.
pub fn report_file_name(name: &str, format: ReportFormat, started: OffsetDateTime) -> String {
    let started = started.to_offset(time::UtcOffset::UTC);
    let stamp = started
        .format(time::macros::format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| started.unix_timestamp().to_string());
    format!("{name}_{stamp}.{}", format.extension())
}

/// Writes every format the selector names into `out_dir`.
///
/// Returns `Err` only when nothing at all could be written.
pub fn write_reports(
    run: &AssessmentRun,
    out_dir: &Path,
    name: &str,
    selector: FormatSelector,
) -> Result<ReportOutcome, ReportWriteError> {
    if let Err(err) = std::fs::create_dir_all(out_dir) {
        warn!(dir = %out_dir.display(), error = %err, "could not create report directory");
    }

    let mut outcome = ReportOutcome::default();
    for format in selector.formats() {
        let path = out_dir.join(report_file_name(name, format, run.start_time()));
        match render_and_write(format.renderer(), run, &path) {
            Ok(bytes) => {
                info!(format = %format, path = %path.display(), bytes, "report written");
                outcome.written.push(WrittenReport {
                    format,
                    path,
                    bytes,
                });
            }
            Err(err) => {
                warn!(format = %format, error = %err, "report failed");
                outcome.failures.push(err);
            }
        }
    }

    if outcome.written.is_empty() {
        return Err(ReportWriteError::NothingWritten {
            failures: outcome.failures,
        });
    }
    Ok(outcome)
}

fn render_and_write(
    renderer: &dyn ReportRenderer,
    run: &AssessmentRun,
    path: &Path,
) -> Result<usize, ReportWriteError> {
    let format = renderer.format();
    let bytes = renderer.render(run)?;
    write_once(path, &bytes).map_err(|source| {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            ReportWriteError::AlreadyExists {
                format,
                path: path.to_path_buf(),
            }
        } else {
            ReportWriteError::Io {
                format,
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    Ok(bytes.len())
}

fn write_once(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    create_and_fill(path, |file| {
        file.write_all(bytes)?;
        file.flush()
    })
}

/// Creates `path` (never an existing file) and fills it. A partial file left
/// by a failed fill is removed so the path stays free.
fn create_and_fill<F>(path: &Path, fill: F) -> std::io::Result<()>
where
    F: FnOnce(&mut std::fs::File) -> std::io::Result<()>,
{
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    if let Err(err) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %cleanup, "could not remove partial report");
        }
        return Err(err);
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_run;
    use super::*;

    #[test]
    fn file_name_uses_utc_start_stamp() {
        let started = time::macros::datetime!(2024-03-05 07:08:09 +02:00);
        assert_eq!(
            report_file_name("Tenant", ReportFormat::Csv, started),
            "Tenant_20240305_050809.csv"
        );
    }

    #[test]
    fn selector_parses_and_expands() {
        assert_eq!("ALL".parse::<FormatSelector>(), Ok(FormatSelector::All));
        assert_eq!(FormatSelector::All.formats().len(), 3);
        assert_eq!(FormatSelector::Csv.formats(), vec![ReportFormat::Csv]);
        assert!("pdf".parse::<FormatSelector>().is_err());
    }

    #[test]
    fn writes_every_requested_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("reports");
        let run = sample_run();
        let outcome = write_reports(&run, &out, "Tenant", FormatSelector::All).expect("write");
        assert_eq!(outcome.written.len(), 3);
        assert!(outcome.failures.is_empty());
        for written in &outcome.written {
            let meta = std::fs::metadata(&written.path).expect("report exists");
            assert_eq!(meta.len() as usize, written.bytes);
        }
    }

    #[test]
    fn existing_file_is_not_overwritten_and_siblings_still_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let run = sample_run();
        let taken = dir
            .path()
            .join(report_file_name("Tenant", ReportFormat::Csv, run.start_time()));
        std::fs::write(&taken, "keep me").expect("seed");

        let outcome =
            write_reports(&run, dir.path(), "Tenant", FormatSelector::All).expect("partial write");
        assert_eq!(outcome.written.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures[0],
            ReportWriteError::AlreadyExists {
                format: ReportFormat::Csv,
                ..
            }
        ));
        assert_eq!(std::fs::read_to_string(&taken).expect("read"), "keep me");
    }

    #[test]
    fn total_failure_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let not_a_dir = dir.path().join("file");
        std::fs::write(&not_a_dir, "").expect("seed");

        let err = write_reports(&sample_run(), &not_a_dir, "Tenant", FormatSelector::All)
            .expect_err("nothing can be written under a regular file");
        match err {
            ReportWriteError::NothingWritten { failures } => assert_eq!(failures.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_fill_removes_the_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Tenant_20240305_050809.html");

        let err = create_and_fill(&path, |file| {
            file.write_all(b"<!doctype html><ht")?;
            Err(std::io::Error::other("disk full"))
        })
        .expect_err("fill fails");
        assert_eq!(err.to_string(), "disk full");
        assert!(!path.exists(), "partial report left behind");

        // The path is free again, so a second attempt can create it.
        write_once(&path, b"complete").expect("retry");
        assert_eq!(std::fs::read(&path).expect("read"), b"complete");
    }
}
