use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;

use crate::access::AccessLayer;
use crate::backend::SnapshotBackend;
use crate::config::{EffectiveConfig, parse_domains};
use crate::core::{AssessmentRun, RiskBand, StatusCounts};
use crate::engine::{Engine, EngineOptions};
use crate::logging::Verbosity;
use crate::report::{FormatSelector, ReportOutcome, ReportWriteError, WrittenReport};
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "tenantscan",
    version,
    about = "Point-in-time security posture assessment of an office-productivity tenant"
)]
pub struct Cli {
    /// Machine-readable output on stdout.
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Overall run deadline in seconds (0 disables it).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Assess a tenant and write reports.
    Assess(AssessArgs),
    /// List the check catalog.
    Domains,
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct AssessArgs {
    /// Tenant export (JSON) to assess.
    #[arg(long)]
    pub tenant: PathBuf,
    /// Directory the reports are written to.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// html, csv, json or all.
    #[arg(long)]
    pub format: Option<FormatSelector>,
    /// Domain key or name to skip. Repeatable, or comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
    /// Run one domain at a time.
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

/// What `assess --json` prints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub risk_score: u32,
    pub risk_band: RiskBand,
    pub status_counts: StatusCounts,
    pub total_findings: usize,
    pub failed_checks: usize,
    pub duration_seconds: f64,
    pub truncated: bool,
    pub domains_assessed: Vec<&'static str>,
    pub domains_excluded: Vec<&'static str>,
    pub reports: Vec<WrittenReport>,
    pub report_failures: Vec<String>,
}

impl RunSummary {
    pub fn new(run: &AssessmentRun, tenant: Option<String>, reports: &ReportOutcome) -> Self {
        Self {
            tenant,
            risk_score: run.risk_score(),
            risk_band: run.risk_band(),
            status_counts: run.status_counts(),
            total_findings: run.findings().len(),
            failed_checks: run.failed_check_count(),
            duration_seconds: run.duration_seconds(),
            truncated: run.truncated(),
            domains_assessed: run.domains_requested().iter().map(|d| d.key()).collect(),
            domains_excluded: run.domains_excluded().iter().map(|d| d.key()).collect(),
            reports: reports.written.clone(),
            report_failures: reports.failures.iter().map(|e| e.to_string()).collect(),
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::config::home_dir();
    let mut cfg = crate::config::load(cli.config.as_deref(), &home_dir)
        .map_err(crate::exit::invalid_args_err)?;
    if let Some(timeout) = cli.timeout {
        cfg.run.timeout_secs = timeout;
    }

    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    crate::logging::init(
        verbosity,
        &cfg.log.level,
        cfg.log.format,
        stderr_is_tty && cfg.ui.color && !cli.no_color,
    );

    let ui_cfg = UiConfig {
        color: stdout_is_tty && cfg.ui.color && !cli.no_color,
        stdout_is_tty,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Assess(args) => assess(args, &cfg, &ui_cfg, cli.json)?,
        Commands::Domains => {
            let entries = crate::checks::describe_catalog(&crate::checks::catalog());
            if cli.json {
                write_json(&entries)?;
            } else {
                crate::ui::print_catalog(&entries);
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "tenantscan", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: use `tenantscan config --show`");
            }
        }
    }

    Ok(())
}

fn assess(args: AssessArgs, cfg: &EffectiveConfig, ui_cfg: &UiConfig, json: bool) -> Result<()> {
    let mut excluded = cfg.excluded_domains().map_err(crate::exit::invalid_args_err)?;
    excluded.extend(parse_domains(&args.exclude).map_err(crate::exit::invalid_args_err)?);
    excluded.sort();
    excluded.dedup();

    let backend = SnapshotBackend::load(&args.tenant).map_err(crate::exit::invalid_args_err)?;
    let tenant = backend.tenant().map(str::to_string);
    let access = AccessLayer::new(Arc::new(backend), cfg.retry_policy());

    let engine = Engine::new(
        access,
        EngineOptions {
            deadline: (cfg.run.timeout_secs > 0).then(|| Duration::from_secs(cfg.run.timeout_secs)),
            max_concurrent_domains: if args.sequential {
                1
            } else {
                cfg.run.max_concurrent_domains
            },
            scoring: cfg.scoring.clone(),
            show_progress: ui_cfg.stderr_is_tty && !ui_cfg.quiet && !json,
        },
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let run = runtime.block_on(engine.run(crate::checks::catalog(), &excluded));

    let out_dir = args.output.unwrap_or_else(|| cfg.report.output_dir.clone());
    let selector = args.format.unwrap_or(cfg.report.formats);
    let (reports, nothing_written) =
        match crate::report::write_reports(&run, &out_dir, &cfg.report.name, selector) {
            Ok(outcome) => (outcome, false),
            Err(ReportWriteError::NothingWritten { failures }) => (
                ReportOutcome {
                    written: Vec::new(),
                    failures,
                },
                true,
            ),
            Err(other) => (
                ReportOutcome {
                    written: Vec::new(),
                    failures: vec![other],
                },
                true,
            ),
        };

    if json {
        write_json(&RunSummary::new(&run, tenant, &reports))?;
    } else {
        crate::ui::print_assessment(&run, &reports, ui_cfg);
    }

    if run.truncated_without_findings() {
        return Err(crate::exit::scan_failed(format!(
            "the run deadline ({}s) passed before any finding was gathered",
            cfg.run.timeout_secs
        )));
    }
    if nothing_written {
        return Err(crate::exit::report_failed_err(anyhow::anyhow!(
            "no report could be written to {} ({} format(s) failed)",
            out_dir.display(),
            reports.failures.len()
        )));
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "unsupported shell: {other} (expected bash|zsh|fish)"
        ))),
    }
}
