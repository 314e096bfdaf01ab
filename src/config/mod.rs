use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::access::RetryPolicy;
use crate::core::{DomainName, ScoringConfig};
use crate::report::{DEFAULT_REPORT_NAME, FormatSelector};

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub run: RunConfig,
    pub access: AccessConfig,
    pub scoring: ScoringConfig,
    pub report: ReportConfig,
    pub log: LogConfig,
    pub ui: UiConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub timeout_secs: u64,
    pub max_concurrent_domains: usize,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub name: String,
    pub formats: FormatSelector,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            run: RunConfig {
                timeout_secs: 300,
                max_concurrent_domains: 4,
                exclude: Vec::new(),
            },
            access: AccessConfig {
                max_retries: 3,
                base_delay_ms: 2000,
                call_timeout_secs: 30,
            },
            scoring: ScoringConfig::default(),
            report: ReportConfig {
                name: DEFAULT_REPORT_NAME.to_string(),
                formats: FormatSelector::All,
                output_dir: PathBuf::from("."),
            },
            log: LogConfig {
                level: "info".to_string(),
                format: LogFormat::Text,
            },
            ui: UiConfig {
                color: true,
                max_table_rows: 20,
            },
            config_path: None,
        }
    }
}

impl EffectiveConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.access.max_retries,
            base_delay: Duration::from_millis(self.access.base_delay_ms),
            call_timeout: Duration::from_secs(self.access.call_timeout_secs),
        }
    }

    /// `run.exclude` resolved to domains. Unknown names are errors.
    pub fn excluded_domains(&self) -> Result<Vec<DomainName>> {
        parse_domains(&self.run.exclude)
    }
}

pub fn parse_domains(names: &[String]) -> Result<Vec<DomainName>> {
    names
        .iter()
        .map(|n| {
            n.parse::<DomainName>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("unknown domain: {n}"))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    run: Option<RawRunConfig>,
    access: Option<RawAccessConfig>,
    scoring: Option<RawScoringConfig>,
    report: Option<RawReportConfig>,
    log: Option<RawLogConfig>,
    ui: Option<RawUiConfig>,
}

#[derive(Debug, Deserialize)]
struct RawRunConfig {
    timeout_secs: Option<u64>,
    max_concurrent_domains: Option<usize>,
    exclude: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawAccessConfig {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    call_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawScoringConfig {
    critical_weight: Option<u32>,
    high_weight: Option<u32>,
    medium_weight: Option<u32>,
    low_weight: Option<u32>,
    cap: Option<u32>,
    low_band_max: Option<u32>,
    medium_band_max: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawReportConfig {
    name: Option<String>,
    formats: Option<FormatSelector>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawLogConfig {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/tenantscan/config.toml")
}

/// `$HOME`, or the current directory when it is unset.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Defaults, then the TOML file, then `TENANTSCAN_*` variables. CLI flags are
/// applied by the caller on top of the result.
pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .or_else(|| {
            std::env::var_os("TENANTSCAN_CONFIG")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file (TOML): {}", path.display()))?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    } else if config_path.is_some() {
        bail!("config file not found: {}", path.display());
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(run) = raw.run {
        if let Some(v) = run.timeout_secs {
            cfg.run.timeout_secs = v;
        }
        if let Some(v) = run.max_concurrent_domains {
            cfg.run.max_concurrent_domains = v;
        }
        if let Some(v) = run.exclude {
            cfg.run.exclude = v;
        }
    }

    if let Some(access) = raw.access {
        if let Some(v) = access.max_retries {
            cfg.access.max_retries = v;
        }
        if let Some(v) = access.base_delay_ms {
            cfg.access.base_delay_ms = v;
        }
        if let Some(v) = access.call_timeout_secs {
            cfg.access.call_timeout_secs = v;
        }
    }

    if let Some(s) = raw.scoring {
        let target = &mut cfg.scoring;
        for (value, slot) in [
            (s.critical_weight, &mut target.critical_weight),
            (s.high_weight, &mut target.high_weight),
            (s.medium_weight, &mut target.medium_weight),
            (s.low_weight, &mut target.low_weight),
            (s.cap, &mut target.cap),
            (s.low_band_max, &mut target.low_band_max),
            (s.medium_band_max, &mut target.medium_band_max),
        ] {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }

    if let Some(report) = raw.report {
        if let Some(v) = report.name {
            cfg.report.name = v;
        }
        if let Some(v) = report.formats {
            cfg.report.formats = v;
        }
        if let Some(v) = report.output_dir {
            cfg.report.output_dir = v;
        }
    }

    if let Some(log) = raw.log {
        if let Some(v) = log.level {
            cfg.log.level = v;
        }
        if let Some(v) = log.format {
            cfg.log.format = v;
        }
    }

    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {name}: {v:?}")),
        Err(_) => Ok(None),
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Some(v) = env_parse("TENANTSCAN_RUN_TIMEOUT_SECS")? {
        cfg.run.timeout_secs = v;
    }
    if let Some(v) = env_parse("TENANTSCAN_RUN_MAX_CONCURRENT_DOMAINS")? {
        cfg.run.max_concurrent_domains = v;
    }
    if let Ok(v) = std::env::var("TENANTSCAN_RUN_EXCLUDE") {
        cfg.run.exclude = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
    }
    if let Some(v) = env_parse("TENANTSCAN_ACCESS_MAX_RETRIES")? {
        cfg.access.max_retries = v;
    }
    if let Some(v) = env_parse("TENANTSCAN_ACCESS_BASE_DELAY_MS")? {
        cfg.access.base_delay_ms = v;
    }
    if let Some(v) = env_parse("TENANTSCAN_ACCESS_CALL_TIMEOUT_SECS")? {
        cfg.access.call_timeout_secs = v;
    }
    if let Ok(v) = std::env::var("TENANTSCAN_REPORT_NAME") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.report.name = v.to_string();
        }
    }
    if let Some(v) = env_parse::<FormatSelector>("TENANTSCAN_REPORT_FORMATS")? {
        cfg.report.formats = v;
    }
    if let Ok(v) = std::env::var("TENANTSCAN_REPORT_OUTPUT_DIR") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.report.output_dir = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("TENANTSCAN_LOG_LEVEL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.log.level = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("TENANTSCAN_LOG_FORMAT") {
        cfg.log.format = match v.trim().to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => bail!("invalid value for TENANTSCAN_LOG_FORMAT: {other} (expected text|json)"),
        };
    }
    if let Ok(v) = std::env::var("TENANTSCAN_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "TENANTSCAN_UI_COLOR")?;
    }
    if let Some(v) = env_parse("TENANTSCAN_UI_MAX_TABLE_ROWS")? {
        cfg.ui.max_table_rows = v;
    }

    Ok(())
}

pub fn validate(cfg: &EffectiveConfig) -> Result<()> {
    if cfg.run.max_concurrent_domains == 0 {
        bail!("run.max_concurrent_domains must be at least 1");
    }
    if cfg.scoring.cap == 0 {
        bail!("scoring.cap must be at least 1");
    }
    if cfg.scoring.low_band_max > cfg.scoring.medium_band_max {
        bail!(
            "scoring.low_band_max ({}) must not exceed scoring.medium_band_max ({})",
            cfg.scoring.low_band_max,
            cfg.scoring.medium_band_max
        );
    }
    let name = cfg.report.name.trim();
    if name.is_empty() || name.contains(['/', '\\']) {
        bail!("report.name must be a plain file name: {:?}", cfg.report.name);
    }
    cfg.excluded_domains()?;
    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: &str) -> RawConfig {
        toml::from_str(s).expect("toml")
    }

    #[test]
    fn file_values_override_defaults() {
        let mut cfg = EffectiveConfig::default();
        apply_raw_config(
            &mut cfg,
            raw(r#"
                [run]
                timeout_secs = 60
                exclude = ["devices", "Alerting"]

                [scoring]
                cap = 80
                low_band_max = 10

                [report]
                formats = "json"
            "#),
        );
        assert_eq!(cfg.run.timeout_secs, 60);
        assert_eq!(cfg.scoring.cap, 80);
        assert_eq!(cfg.scoring.low_band_max, 10);
        assert_eq!(cfg.scoring.medium_band_max, 50);
        assert_eq!(cfg.report.formats, FormatSelector::Json);
        assert_eq!(
            cfg.excluded_domains().expect("domains"),
            vec![DomainName::DeviceManagement, DomainName::Alerting]
        );
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<RawConfig>("[runn]\ntimeout_secs = 1\n").is_err());
    }

    #[test]
    fn validation_catches_inverted_bands_and_zero_concurrency() {
        let mut cfg = EffectiveConfig::default();
        cfg.scoring.low_band_max = 60;
        assert!(validate(&cfg).is_err());

        let mut cfg = EffectiveConfig::default();
        cfg.run.max_concurrent_domains = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = EffectiveConfig::default();
        cfg.run.exclude = vec!["printers".to_string()];
        assert!(validate(&cfg).is_err());

        let mut cfg = EffectiveConfig::default();
        cfg.report.name = "../escape".to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn retry_policy_from_access_section() {
        let cfg = EffectiveConfig::default();
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.call_timeout, Duration::from_secs(30));
    }
}
