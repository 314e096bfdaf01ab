//! Diagnostic logging to stderr. Stdout is reserved for command output.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

pub const LOG_ENV: &str = "TENANTSCAN_LOG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Filter directive: `TENANTSCAN_LOG`, then the verbosity flags, then the
/// configured level.
pub fn directive(verbosity: Verbosity, configured: &str) -> String {
    if let Ok(v) = std::env::var(LOG_ENV) {
        if !v.trim().is_empty() {
            return v;
        }
    }
    match verbosity {
        Verbosity::Quiet => "error".to_string(),
        Verbosity::Verbose => "debug".to_string(),
        Verbosity::Normal => configured.to_string(),
    }
}

/// Installs the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init(verbosity: Verbosity, configured_level: &str, format: LogFormat, color: bool) {
    let filter = EnvFilter::try_new(directive(verbosity, configured_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(color).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_flags_override_configured_level() {
        // TENANTSCAN_LOG is not set by the test harness.
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        assert_eq!(directive(Verbosity::Quiet, "info"), "error");
        assert_eq!(directive(Verbosity::Verbose, "warn"), "debug");
        assert_eq!(directive(Verbosity::Normal, "warn"), "warn");
    }
}
