// src/kernel/mod.rs

//! Kernel event handle abstraction.
//!
//! A [`KernelQueue`] owns one kernel polling descriptor (a kqueue on
//! macOS/BSD, an inotify instance on Linux) against which every watched
//! descriptor of a queue is registered. The monitor loop blocks on it with a
//! bounded timeout, so one thread serves any number of watched paths.
//!
//! - [`inotify`] is the Linux backend.
//! - [`kqueue`] is the macOS/BSD backend.
//! - [`mock`] is an in-memory backend for tests that injects synthetic events.

use std::fmt::Debug;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::fs::Descriptor;
use crate::types::EventSet;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod inotify;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub mod kqueue;
pub mod mock;

/// Kernel-assigned handle correlating a poll result back to a watch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

/// One readiness record returned by [`KernelQueue::poll`], already
/// translated into the public event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub token: Token,
    pub events: EventSet,
}

/// Outcome of a single bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// The wait returned (possibly with zero events); keep polling.
    Ready,
    /// The handle was closed; the caller must stop polling.
    Closed,
}

/// A kernel event-notification handle shared by all watches of one queue.
///
/// Implementations must allow `register`/`deregister` from caller threads
/// while another thread is blocked in `poll`.
pub trait KernelQueue: Send + Sync + Debug {
    /// Register interest in `interest` for the open `descriptor`.
    fn register(
        &self,
        descriptor: &Descriptor,
        path: &Path,
        interest: EventSet,
    ) -> io::Result<Token>;

    /// Drop the registration identified by `token`. The descriptor is still
    /// open when this is called; the caller closes it afterwards regardless
    /// of the result.
    fn deregister(&self, descriptor: &Descriptor, token: Token) -> io::Result<()>;

    /// Wait up to `timeout` and append translated events to `events`.
    fn poll(&self, timeout: Duration, events: &mut Vec<RawEvent>) -> io::Result<PollStatus>;

    /// Close the handle. Every later `poll` returns [`PollStatus::Closed`]
    /// without blocking; a wait already in progress returns within its
    /// timeout.
    fn close(&self);

    /// Whether size growth and link-count changes must be derived by
    /// comparing `fstat` snapshots, because the kernel does not report them.
    fn needs_stat_refinement(&self) -> bool {
        false
    }
}

/// Lazily opens a kernel handle on the first successful watch.
pub type KernelFactory = Arc<dyn Fn() -> io::Result<Arc<dyn KernelQueue>> + Send + Sync>;

/// Factory for the backend native to the current platform.
pub fn platform_factory() -> KernelFactory {
    Arc::new(open_platform_queue)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn open_platform_queue() -> io::Result<Arc<dyn KernelQueue>> {
    Ok(Arc::new(inotify::InotifyQueue::open()?))
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
fn open_platform_queue() -> io::Result<Arc<dyn KernelQueue>> {
    Ok(Arc::new(kqueue::KqueueQueue::open()?))
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
fn open_platform_queue() -> io::Result<Arc<dyn KernelQueue>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no kernel event backend for this platform",
    ))
}
