// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::DEFAULT_BROADCAST_CAPACITY;
use crate::engine::DEFAULT_SLEEP_INTERVAL;
use crate::types::{EventSet, QueueEvent};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [queue]
/// sleep_interval = "250ms"
/// always_post_notifications = false
/// broadcast_capacity = 256
///
/// [watch]
/// paths = ["/tmp/a.txt"]
/// events = ["write", "delete"]
/// ```
///
/// Both sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub queue: RawQueueSection,

    #[serde(default)]
    pub watch: RawWatchSection,
}

/// `[queue]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawQueueSection {
    /// Duration string (`"250ms"`, `"1s"`); bounds each kernel wait.
    #[serde(default)]
    pub sleep_interval: Option<String>,

    /// Broadcast even when a delegate is set.
    #[serde(default)]
    pub always_post_notifications: bool,

    /// Capacity of the in-process broadcast channel.
    #[serde(default)]
    pub broadcast_capacity: Option<usize>,
}

/// `[watch]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWatchSection {
    /// Absolute paths to watch at startup.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Event kinds to watch for; all kinds when omitted.
    #[serde(default)]
    pub events: Option<Vec<QueueEvent>>,
}

/// Validated configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub queue: QueueSettings,
    pub watch: WatchSettings,
}

/// Queue-level settings, ready to hand to
/// [`PathQueueBuilder::from_config`](crate::engine::PathQueueBuilder::from_config).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub sleep_interval: Duration,
    pub always_post_notifications: bool,
    pub broadcast_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            sleep_interval: DEFAULT_SLEEP_INTERVAL,
            always_post_notifications: false,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub paths: Vec<PathBuf>,
    pub events: EventSet,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            events: EventSet::ALL,
        }
    }
}
