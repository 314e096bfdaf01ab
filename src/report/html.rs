use std::fmt::Write as _;

use time::format_description::well_known::Rfc3339;

use crate::core::{AssessmentRun, Finding, Severity};
use crate::report::{ReportFormat, ReportRenderer, ReportWriteError};

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#1f2328}\
table{border-collapse:collapse}td,th{border:1px solid #d0d7de;padding:.3rem .6rem;text-align:left}\
.finding{border-left:6px solid #8c959f;padding:.4rem 1rem;margin:1rem 0;background:#f6f8fa}\
.critical{border-color:#8b0000}.high{border-color:#cf222e}.medium{border-color:#bf8700}\
.low{border-color:#0969da}.info{border-color:#8c959f}.banner{background:#fff8c5;padding:.6rem}";

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl ReportRenderer for HtmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn render(&self, run: &AssessmentRun) -> Result<Vec<u8>, ReportWriteError> {
        Ok(render_document(run).into_bytes())
    }
}

pub fn render_document(run: &AssessmentRun) -> String {
    let mut out = String::new();
    let counts = run.status_counts();

    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">");
    let _ = writeln!(out, "<title>Tenant Security Assessment</title>");
    let _ = writeln!(out, "<style>{STYLE}</style>\n</head>\n<body>");
    let _ = writeln!(out, "<h1>Tenant Security Assessment</h1>");

    if run.truncated() {
        let _ = writeln!(
            out,
            "<p class=\"banner\">This run hit its deadline; some domains were not assessed.</p>"
        );
    }

    let _ = writeln!(out, "<section id=\"summary\">\n<h2>Summary</h2>\n<table>");
    summary_row(&mut out, "Risk score", &run.risk_score().to_string());
    summary_row(&mut out, "Risk band", run.risk_band().as_str());
    for severity in Severity::ALL {
        summary_row(&mut out, severity.as_str(), &counts.get(severity).to_string());
    }
    summary_row(&mut out, "Total findings", &run.findings().len().to_string());
    summary_row(
        &mut out,
        "Started",
        &run.start_time().format(&Rfc3339).unwrap_or_default(),
    );
    summary_row(
        &mut out,
        "Duration",
        &format!("{:.1}s", run.duration_seconds()),
    );
    summary_row(&mut out, "Domains assessed", &domain_list(run.domains_requested()));
    if !run.domains_excluded().is_empty() {
        summary_row(&mut out, "Domains excluded", &domain_list(run.domains_excluded()));
    }
    if run.failed_check_count() > 0 {
        summary_row(
            &mut out,
            "Checks not evaluated",
            &run.failed_check_count().to_string(),
        );
    }
    let _ = writeln!(out, "</table>\n</section>");

    let _ = writeln!(
        out,
        "<section id=\"findings\">\n<h2>Findings ({})</h2>",
        run.findings().len()
    );
    if run.findings().is_empty() {
        let _ = writeln!(out, "<p><em>No findings.</em></p>");
    }
    for finding in run.presentation_order() {
        finding_card(&mut out, finding);
    }
    let _ = writeln!(out, "</section>\n</body>\n</html>");
    out
}

fn summary_row(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(
        out,
        "<tr><th>{}</th><td>{}</td></tr>",
        escape(label),
        escape(value)
    );
}

fn finding_card(out: &mut String, f: &Finding) {
    let class = f.severity.as_str().to_ascii_lowercase();
    let _ = writeln!(
        out,
        "<article class=\"finding {class}\" data-severity=\"{}\">",
        f.severity.as_str()
    );
    let _ = writeln!(
        out,
        "<h3>[{}] {}</h3>",
        f.severity.as_str(),
        escape(&f.title)
    );
    let _ = writeln!(
        out,
        "<p><strong>Domain:</strong> {} &middot; <code>{}</code></p>",
        escape(f.domain.display_name()),
        escape(&f.check_id)
    );
    if !f.description.is_empty() {
        let _ = writeln!(out, "<p>{}</p>", escape(&f.description));
    }
    if !f.remediation.is_empty() {
        let _ = writeln!(
            out,
            "<p><strong>Remediation:</strong> {}</p>",
            escape(&f.remediation)
        );
    }
    if !f.compliance_refs.is_empty() {
        let refs: Vec<String> = f.compliance_refs.iter().map(|r| escape(r)).collect();
        let _ = writeln!(out, "<p><strong>Compliance:</strong> {}</p>", refs.join(", "));
    }
    if let Some(url) = &f.reference {
        let url = escape(url);
        let _ = writeln!(out, "<p><a href=\"{url}\">{url}</a></p>");
    }
    let _ = writeln!(out, "</article>");
}

fn domain_list(domains: &[crate::core::DomainName]) -> String {
    if domains.is_empty() {
        return "none".to_string();
    }
    domains
        .iter()
        .map(|d| d.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
