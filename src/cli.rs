// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::parse_duration;
use crate::types::{EventSet, QueueEvent};

/// Command-line arguments for `pathqueue`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pathqueue",
    version,
    about = "Watch files through the kernel event queue and print what happens to them.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to a config file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Comma-separated event kinds to report (e.g. `write,delete`), or `all`.
    ///
    /// Overrides `[watch].events` from the config file.
    #[arg(long, value_name = "LIST", value_delimiter = ',', value_parser = parse_event_selector)]
    pub events: Vec<EventSet>,

    /// Also broadcast notifications while the printing delegate is set.
    #[arg(long)]
    pub always_post: bool,

    /// Upper bound on a single kernel wait (e.g. `250ms`, `1s`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub sleep_interval: Option<Duration>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PATHQUEUE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Files or directories to watch, in addition to `[watch].paths`.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_event_selector(s: &str) -> Result<EventSet, String> {
    if s.trim().eq_ignore_ascii_case("all") {
        return Ok(EventSet::ALL);
    }
    s.parse::<QueueEvent>().map(QueueEvent::flag)
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
