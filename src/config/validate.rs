// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, QueueSettings, RawConfigFile, WatchSettings};
use crate::errors::{PathQueueError, Result};
use crate::types::EventSet;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PathQueueError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let queue = validate_queue_section(&raw)?;
        let watch = validate_watch_section(raw)?;
        Ok(ConfigFile { queue, watch })
    }
}

/// Validate an already-parsed configuration.
pub fn validate_config(raw: RawConfigFile) -> Result<ConfigFile> {
    ConfigFile::try_from(raw)
}

fn validate_queue_section(cfg: &RawConfigFile) -> Result<QueueSettings> {
    let defaults = QueueSettings::default();

    let sleep_interval = match cfg.queue.sleep_interval.as_deref() {
        Some(s) => parse_duration(s)
            .map_err(|e| PathQueueError::Config(format!("[queue].sleep_interval: {e}")))?,
        None => defaults.sleep_interval,
    };
    if sleep_interval.is_zero() {
        return Err(PathQueueError::Config(
            "[queue].sleep_interval must be greater than zero".to_string(),
        ));
    }

    let broadcast_capacity = cfg
        .queue
        .broadcast_capacity
        .unwrap_or(defaults.broadcast_capacity);
    if broadcast_capacity == 0 {
        return Err(PathQueueError::Config(
            "[queue].broadcast_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(QueueSettings {
        sleep_interval,
        always_post_notifications: cfg.queue.always_post_notifications,
        broadcast_capacity,
    })
}

fn validate_watch_section(cfg: RawConfigFile) -> Result<WatchSettings> {
    for path in &cfg.watch.paths {
        if !path.is_absolute() {
            return Err(PathQueueError::Config(format!(
                "[watch].paths entries must be absolute (got {:?})",
                path
            )));
        }
    }

    let events = match cfg.watch.events {
        Some(list) if list.is_empty() => {
            return Err(PathQueueError::Config(
                "[watch].events must name at least one event".to_string(),
            ));
        }
        Some(list) => list.into_iter().collect(),
        None => EventSet::ALL,
    };

    Ok(WatchSettings {
        paths: cfg.watch.paths,
        events,
    })
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: {s}"))
}
