// src/logging.rs

//! Subscriber installation for the `pathqueue` binary.
//!
//! The filter comes from the `--log-level` flag when given, then from the
//! `PATHQUEUE_LOG` variable, then falls back to `info`. The variable accepts
//! full [`EnvFilter`] directives, so `PATHQUEUE_LOG=info,pathqueue::kernel=trace`
//! turns up only the kernel backends. Output goes to stderr; stdout carries
//! event lines only.

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "PATHQUEUE_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Choose the filter directive. Blank environment values count as unset.
pub fn filter_directive(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(level) = cli_level {
        let directive = match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        return directive.to_owned();
    }

    env_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVE)
        .to_owned()
}

/// Parse `directive`, substituting the default filter when it is malformed.
///
/// The second element describes the rejected directive so the caller can
/// report it once a subscriber exists.
pub fn build_filter(directive: &str) -> (EnvFilter, Option<String>) {
    match EnvFilter::try_new(directive) {
        Ok(filter) => (filter, None),
        Err(err) => (
            EnvFilter::new(DEFAULT_DIRECTIVE),
            Some(format!("{directive:?} ({err})")),
        ),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let directive = filter_directive(cli_level, env_value.as_deref());
    let (filter, rejected) = build_filter(&directive);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    if let Some(rejected) = rejected {
        warn!(var = LOG_ENV_VAR, "ignoring log filter {rejected}, using {DEFAULT_DIRECTIVE}");
    }
    Ok(())
}
