// src/watch/monitor.rs

//! The event monitor loop.
//!
//! One background thread per queue blocks on the kernel handle with a
//! bounded timeout, resolves the returned tokens through the registry and
//! hands each `(path, events)` pair to the dispatcher. The registry lock is
//! taken only for the resolve step, never across the wait or the delivery.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, trace, warn};

use crate::engine::queue::Shared;
use crate::engine::{PathQueue, QueueId};
use crate::kernel::{KernelQueue, PollStatus, RawEvent};
use crate::types::EventSet;

/// Spawn the monitor thread for a queue.
///
/// The thread only holds a weak reference to the queue, so dropping the last
/// [`PathQueue`] handle tears the queue down; the loop notices on its next
/// cycle (or immediately, through the closed kernel handle) and returns.
pub(crate) fn spawn_monitor(
    queue: Weak<Shared>,
    kernel: Arc<dyn KernelQueue>,
    id: QueueId,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("pathqueue-monitor-{id}"))
        .spawn(move || run_monitor(queue, kernel, id))
}

fn run_monitor(queue: Weak<Shared>, kernel: Arc<dyn KernelQueue>, id: QueueId) {
    info!(queue = %id, "monitor loop started");

    let mut raw: Vec<RawEvent> = Vec::new();
    let mut resolved: Vec<(PathBuf, EventSet)> = Vec::new();

    loop {
        // Read the interval fresh each cycle; no strong reference is held
        // across the wait.
        let Some(interval) = queue.upgrade().map(|shared| shared.sleep_interval()) else {
            break;
        };

        raw.clear();
        match kernel.poll(interval, &mut raw) {
            Ok(PollStatus::Ready) => {}
            Ok(PollStatus::Closed) => {
                debug!(queue = %id, "kernel handle closed");
                break;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                trace!(queue = %id, "poll interrupted; retrying");
                continue;
            }
            Err(err) => {
                warn!(queue = %id, error = %err, "poll failed; retrying next cycle");
                thread::sleep(interval);
                continue;
            }
        }

        if raw.is_empty() {
            continue;
        }

        let Some(shared) = queue.upgrade() else {
            break;
        };

        resolved.clear();
        shared.resolve(&raw, &mut resolved);
        trace!(queue = %id, raw = raw.len(), resolved = resolved.len(), "poll cycle");

        let handle = PathQueue::from_shared(shared);
        for (path, events) in resolved.drain(..) {
            handle.dispatch(&path, events);
        }
        // `handle` may be the last strong reference; dropping it here tears
        // the queue down from this thread.
    }

    info!(queue = %id, "monitor loop finished");
}
