// src/lib.rs

//! Kernel-backed file change notifications.
//!
//! Register paths with a [`PathQueue`] and get told, through an
//! [`EventDelegate`] and/or a broadcast [`NotificationSink`], when the
//! kernel reports that a watched file was renamed, written, deleted, had its
//! attributes, size or link count changed, or had access revoked.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod kernel;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

pub use crate::dispatch::{EventDelegate, Notification, NotificationCenter, NotificationSink};
pub use crate::engine::{AddOutcome, PathQueue, PathQueueBuilder, QueueId};
pub use crate::errors::PathQueueError;
pub use crate::types::{EventSet, QueueEvent};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - a queue with a printing delegate that re-registers each path after
///   every event
/// - a broadcast listener (only fed with `--always-post`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = match &args.config {
        Some(path) => load_and_validate(path)?,
        None => ConfigFile::default(),
    };

    let mut settings = cfg.queue;
    if let Some(interval) = args.sleep_interval {
        settings.sleep_interval = interval;
    }
    settings.always_post_notifications |= args.always_post;

    let events = if args.events.is_empty() {
        cfg.watch.events
    } else {
        args.events.iter().fold(EventSet::empty(), |acc, set| acc | *set)
    };

    let paths = watch_targets(&cfg.watch.paths, &args.paths)?;
    if paths.is_empty() {
        bail!("nothing to watch: pass paths on the command line or in [watch].paths");
    }

    let center = NotificationCenter::new(settings.broadcast_capacity);
    let queue = PathQueueBuilder::from_config(&settings)
        .notification_center(&center)
        .build();

    let printer = Arc::new(PrintingDelegate { events });
    queue.set_delegate(&printer);

    for path in &paths {
        queue.add_path_with(path, events);
    }
    let watched = queue.number_of_watched_paths();
    if watched == 0 {
        bail!("none of the {} path(s) could be watched", paths.len());
    }
    info!(watched, requested = paths.len(), ?events, "watching");

    let mut notifications = center.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                break;
            }
            msg = notifications.recv() => match msg {
                Ok(note) => println!("[broadcast]\t{}\t{}", note.topic(), note.path.display()),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "broadcast listener lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("shutting down");
    queue.close();
    Ok(())
}

/// Config paths first, then CLI paths made absolute against the working
/// directory.
fn watch_targets(config_paths: &[PathBuf], cli_paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut targets = config_paths.to_vec();
    for path in cli_paths {
        let absolute = std::path::absolute(path)?;
        if !targets.contains(&absolute) {
            targets.push(absolute);
        }
    }
    Ok(targets)
}

/// Prints every delivered event and re-registers its path, so watching
/// continues across atomic saves.
struct PrintingDelegate {
    events: EventSet,
}

impl EventDelegate for PrintingDelegate {
    fn on_event(&self, queue: &PathQueue, event: QueueEvent, path: &Path) {
        println!("{event}\t{}", path.display());

        queue.remove_path(path);
        queue.add_path_with(path, self.events);
        if !queue.is_watching(path) {
            info!(path = %path.display(), "path is gone; no longer watching it");
        }
    }
}
