use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::checks::CatalogEntry;
use crate::core::{AssessmentRun, Finding, RiskBand, Severity};
use crate::report::ReportOutcome;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "next:");
    let _ = writeln!(stderr, "  - re-run with `--verbose` for backend call details");
    let _ = writeln!(
        stderr,
        "  - see `tenantscan --help` for the available commands and options"
    );
}

pub fn print_assessment(run: &AssessmentRun, reports: &ReportOutcome, cfg: &UiConfig) {
    let mut out = io::stdout().lock();
    let _ = write_assessment(&mut out, run, reports, cfg);
}

fn write_assessment(
    out: &mut dyn Write,
    run: &AssessmentRun,
    reports: &ReportOutcome,
    cfg: &UiConfig,
) -> io::Result<()> {
    let counts = run.status_counts();
    let color = cfg.color && cfg.stdout_is_tty;

    writeln!(
        out,
        "Risk score: {} ({})",
        run.risk_score(),
        format_band(run.risk_band(), color)
    )?;
    let tally: Vec<String> = Severity::ALL
        .iter()
        .map(|s| format!("{} {}", format_severity(*s, color), counts.get(*s)))
        .collect();
    writeln!(out, "Findings:   {}  ({})", counts.total(), tally.join(", "))?;
    writeln!(
        out,
        "Domains:    {} assessed, {} excluded",
        run.domains_requested().len(),
        run.domains_excluded().len()
    )?;
    writeln!(out, "Duration:   {:.1}s", run.duration_seconds())?;
    if run.failed_check_count() > 0 {
        writeln!(
            out,
            "Coverage:   {} check(s) could not be evaluated",
            run.failed_check_count()
        )?;
    }
    if run.truncated() {
        writeln!(
            out,
            "Truncated:  the run deadline passed before every domain finished"
        )?;
    }

    if !cfg.quiet && !run.findings().is_empty() {
        writeln!(out)?;
        let ordered = run.presentation_order();
        write_findings_table(out, &ordered, cfg.max_table_rows, color)?;
        if ordered.len() > cfg.max_table_rows {
            writeln!(
                out,
                "... {} more in the reports",
                ordered.len() - cfg.max_table_rows
            )?;
        }
    }

    if !reports.written.is_empty() || !reports.failures.is_empty() {
        writeln!(out)?;
    }
    for written in &reports.written {
        writeln!(out, "Report ({}): {}", written.format, written.path.display())?;
    }
    for failure in &reports.failures {
        writeln!(out, "Report failed: {failure}")?;
    }
    Ok(())
}

pub fn print_catalog(entries: &[CatalogEntry]) {
    let mut out = io::stdout().lock();
    for entry in entries {
        let _ = writeln!(out, "{} ({})", entry.key, entry.name);
        let id_w = entry
            .checks
            .iter()
            .map(|c| visible_width_ansi(c.id))
            .max()
            .unwrap_or(0);
        for check in &entry.checks {
            let _ = writeln!(out, "  {}  {}", pad_end_ansi(check.id, id_w), check.control);
        }
    }
}

fn write_findings_table(
    out: &mut dyn Write,
    findings: &[&Finding],
    rows: usize,
    color: bool,
) -> io::Result<()> {
    let label_sev = "Severity";
    let label_domain = "Domain";
    let label_title = "Title";

    let sev_w = visible_width_ansi(label_sev).max(8);
    let domain_w = findings
        .iter()
        .take(rows)
        .map(|f| visible_width_ansi(f.domain.display_name()))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_domain));

    writeln!(
        out,
        "{}  {}  {}",
        pad_end_ansi(label_sev, sev_w),
        pad_end_ansi(label_domain, domain_w),
        label_title
    )?;
    writeln!(
        out,
        "{}  {}  {}",
        "-".repeat(sev_w),
        "-".repeat(domain_w),
        "-".repeat(visible_width_ansi(label_title).max(5))
    )?;

    for finding in findings.iter().take(rows) {
        let sev = pad_end_ansi(&format_severity(finding.severity, color), sev_w);
        let domain = pad_end_ansi(finding.domain.display_name(), domain_w);
        writeln!(out, "{sev}  {domain}  {}", truncate_end(&finding.title, 96))?;
    }
    Ok(())
}

fn format_severity(severity: Severity, color: bool) -> String {
    let s = severity.as_str();
    if !color {
        return s.to_string();
    }
    let code = match severity {
        Severity::Critical => "1;31",
        Severity::High => "31",
        Severity::Medium => "33",
        Severity::Low => "36",
        Severity::Info => "90",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn format_band(band: RiskBand, color: bool) -> String {
    let s = band.as_str();
    if !color {
        return s.to_string();
    }
    let code = match band {
        RiskBand::Low => "32",
        RiskBand::Medium => "33",
        RiskBand::High => "31",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn truncate_end(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn pad_end_ansi(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
