// src/engine/mod.rs

//! The queue engine.
//!
//! [`PathQueue`] ties together:
//! - the watch registry (paths, descriptors, kernel tokens)
//! - the kernel event handle, opened on the first successful watch
//! - the monitor thread, started alongside the kernel handle
//! - the dispatcher (delegate and broadcast delivery)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod queue;

pub use crate::watch::registry::AddOutcome;
pub use queue::{DEFAULT_SLEEP_INTERVAL, PathQueue, PathQueueBuilder};

/// Identity of a queue instance, carried as the `source` of every broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(u64);

impl QueueId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        QueueId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
