// src/engine/queue.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::QueueSettings;
use crate::dispatch::{
    DEFAULT_BROADCAST_CAPACITY, Dispatcher, EventDelegate, NotificationCenter, NotificationSink,
};
use crate::errors::{PathQueueError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::kernel::{KernelFactory, RawEvent, platform_factory};
use crate::types::EventSet;
use crate::watch::monitor::spawn_monitor;
use crate::watch::registry::{AddOutcome, WatchRegistry};

use super::QueueId;

/// Poll timeout used when none is configured.
pub const DEFAULT_SLEEP_INTERVAL: Duration = Duration::from_secs(1);

/// State shared between the public handles and the monitor thread.
pub(crate) struct Shared {
    id: QueueId,
    registry: Mutex<WatchRegistry>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Dispatcher,
    sleep_interval_nanos: AtomicU64,
    fs: Arc<dyn FileSystem>,
    kernel_factory: KernelFactory,
}

impl Shared {
    fn lock_registry(&self) -> MutexGuard<'_, WatchRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_monitor(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn sleep_interval(&self) -> Duration {
        Duration::from_nanos(self.sleep_interval_nanos.load(Ordering::Acquire))
    }

    /// Resolve a batch of kernel events under the registry lock.
    pub(crate) fn resolve(&self, batch: &[RawEvent], out: &mut Vec<(PathBuf, EventSet)>) {
        let mut registry = self.lock_registry();
        let refine = registry
            .kernel()
            .is_some_and(|kernel| kernel.needs_stat_refinement());
        for event in batch {
            registry.resolve(*event, refine, out);
        }
    }

    fn shutdown(&self) {
        self.lock_registry().close();

        let Some(handle) = self.lock_monitor().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Torn down from inside a callback; the loop exits on its own.
            return;
        }
        if handle.join().is_err() {
            warn!(queue = %self.id, "monitor thread panicked");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A set of watched paths and the machinery that reports changes to them.
///
/// `PathQueue` is a cheap, clonable handle; all clones refer to the same
/// queue. The queue is torn down by [`close`](Self::close) or when the last
/// handle is dropped: every descriptor is closed, the kernel handle is
/// closed and the monitor thread exits.
///
/// # Atomic saves
///
/// A watch follows the file that was open when the path was added. Editors
/// that save atomically write a new file and rename it over the old one; the
/// queue then reports the change (typically `Delete` or `Rename`) and never
/// hears about that path again. Callers that want to keep following a path
/// should, on every delivered event, call [`remove_path`](Self::remove_path)
/// followed by [`add_path`](Self::add_path) for it. This is not done
/// automatically because user space cannot reliably tell when the
/// replacement file has appeared.
#[derive(Clone)]
pub struct PathQueue {
    shared: Arc<Shared>,
}

impl fmt::Debug for PathQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathQueue")
            .field("id", &self.shared.id)
            .field("watched", &self.number_of_watched_paths())
            .finish_non_exhaustive()
    }
}

impl Default for PathQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PathQueue {
    /// Queue using the platform's kernel backend and a private
    /// [`NotificationCenter`] with default settings.
    pub fn new() -> Self {
        PathQueueBuilder::new().build()
    }

    pub fn builder() -> PathQueueBuilder {
        PathQueueBuilder::new()
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> QueueId {
        self.shared.id
    }

    /// Watch `path` for every event kind.
    ///
    /// Same as [`add_path_with`](Self::add_path_with) with [`EventSet::ALL`].
    pub fn add_path(&self, path: impl AsRef<Path>) {
        self.add_path_with(path, EventSet::ALL);
    }

    /// Watch `path` for the event kinds in `flags`.
    ///
    /// Pass full paths as the OS sees them; no tilde expansion or URL
    /// handling is done. Adding a path that is already watched does nothing,
    /// even with different flags.
    ///
    /// Failures (the file cannot be opened, the process is out of
    /// descriptors, the kernel refuses the registration) are logged and
    /// otherwise ignored: the path is simply not watched. Use
    /// [`try_add_path_with`](Self::try_add_path_with) to observe them.
    pub fn add_path_with(&self, path: impl AsRef<Path>, flags: EventSet) {
        let path = path.as_ref();
        if let Err(err) = self.try_add_path_with(path, flags) {
            warn!(
                path = %path.display(),
                error = %err,
                exhausted = err.is_descriptor_exhaustion(),
                "not watching path"
            );
        }
    }

    /// Like [`add_path_with`](Self::add_path_with), but reports failures.
    ///
    /// On error the registry is unchanged and no descriptor stays open.
    pub fn try_add_path_with(&self, path: impl AsRef<Path>, flags: EventSet) -> Result<AddOutcome> {
        let path = path.as_ref();

        {
            let registry = self.shared.lock_registry();
            if registry.is_closed() {
                return Err(PathQueueError::Closed);
            }
            if registry.contains(path) {
                return Ok(AddOutcome::AlreadyWatched);
            }
        }

        // Opening can block (network volumes); keep it outside the lock.
        let descriptor =
            self.shared
                .fs
                .open_descriptor(path)
                .map_err(|source| PathQueueError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut registry = self.shared.lock_registry();
        let outcome = registry.insert(path, descriptor, flags, &self.shared.kernel_factory)?;
        if outcome == AddOutcome::Added {
            self.ensure_monitor(&registry);
        }
        Ok(outcome)
    }

    /// Start the monitor thread if it is not running. Called with the
    /// registry lock held so two adders cannot both spawn one.
    fn ensure_monitor(&self, registry: &WatchRegistry) {
        let Some(kernel) = registry.kernel() else {
            return;
        };

        let mut monitor = self.shared.lock_monitor();
        if monitor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        match spawn_monitor(Arc::downgrade(&self.shared), kernel, self.shared.id) {
            Ok(handle) => *monitor = Some(handle),
            Err(err) => {
                // Entries stay registered; the next add retries the spawn.
                warn!(queue = %self.shared.id, error = %err, "failed to start monitor thread");
            }
        }
    }

    /// Stop watching `path`. Does nothing if it is not watched.
    pub fn remove_path(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !self.shared.lock_registry().remove(path) {
            debug!(path = %path.display(), "remove_path: not watched");
        }
    }

    /// Stop watching every path. No descriptor stays open.
    pub fn remove_all_paths(&self) {
        let removed = self.shared.lock_registry().remove_all();
        debug!(queue = %self.shared.id, removed, "removed all paths");
    }

    /// Number of watched paths at the time of the call.
    pub fn number_of_watched_paths(&self) -> usize {
        self.shared.lock_registry().len()
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.shared.lock_registry().contains(path.as_ref())
    }

    /// Snapshot of the watched paths, in no particular order.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.shared.lock_registry().paths()
    }

    /// Interest flags of a watched path.
    pub fn interest(&self, path: impl AsRef<Path>) -> Option<EventSet> {
        self.shared
            .lock_registry()
            .entry(path.as_ref())
            .map(|entry| entry.interest())
    }

    /// Install the delegate. The queue keeps only a weak reference.
    pub fn set_delegate<D: EventDelegate + 'static>(&self, delegate: &Arc<D>) {
        self.shared.dispatcher.set_delegate(delegate);
    }

    pub fn clear_delegate(&self) {
        self.shared.dispatcher.clear_delegate();
    }

    /// Whether a delegate is set and still alive.
    pub fn has_delegate(&self) -> bool {
        self.shared.dispatcher.delegate().is_some()
    }

    /// When false (the default) notifications are broadcast only if no
    /// delegate is set.
    pub fn always_post_notifications(&self) -> bool {
        self.shared.dispatcher.always_post()
    }

    pub fn set_always_post_notifications(&self, value: bool) {
        self.shared.dispatcher.set_always_post(value);
    }

    pub fn sleep_interval(&self) -> Duration {
        self.shared.sleep_interval()
    }

    /// Upper bound on a single kernel wait. Takes effect on the next wait.
    pub fn set_sleep_interval(&self, interval: Duration) {
        self.shared
            .sleep_interval_nanos
            .store(duration_nanos(interval), Ordering::Release);
    }

    pub(crate) fn dispatch(&self, path: &Path, events: EventSet) {
        self.shared.dispatcher.dispatch(self, path, events);
    }

    /// Tear the queue down now instead of waiting for the last handle to
    /// drop. Later adds fail with [`PathQueueError::Closed`].
    pub fn close(&self) {
        self.shared.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock_registry().is_closed()
    }
}

fn duration_nanos(interval: Duration) -> u64 {
    // A zero timeout would turn the monitor into a busy loop.
    let interval = interval.max(Duration::from_millis(1));
    u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX)
}

/// Configures and creates a [`PathQueue`].
pub struct PathQueueBuilder {
    sleep_interval: Duration,
    always_post_notifications: bool,
    broadcast_capacity: usize,
    sink: Option<Arc<dyn NotificationSink>>,
    kernel: Option<KernelFactory>,
    fs: Option<Arc<dyn FileSystem>>,
}

impl fmt::Debug for PathQueueBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathQueueBuilder")
            .field("sleep_interval", &self.sleep_interval)
            .field("always_post_notifications", &self.always_post_notifications)
            .field("broadcast_capacity", &self.broadcast_capacity)
            .field("sink", &self.sink)
            .field("custom_kernel", &self.kernel.is_some())
            .field("fs", &self.fs)
            .finish()
    }
}

impl Default for PathQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PathQueueBuilder {
    pub fn new() -> Self {
        Self {
            sleep_interval: DEFAULT_SLEEP_INTERVAL,
            always_post_notifications: false,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            sink: None,
            kernel: None,
            fs: None,
        }
    }

    /// Apply the `[queue]` section of a config file.
    pub fn from_config(settings: &QueueSettings) -> Self {
        Self::new()
            .sleep_interval(settings.sleep_interval)
            .always_post_notifications(settings.always_post_notifications)
            .broadcast_capacity(settings.broadcast_capacity)
    }

    pub fn sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = interval;
        self
    }

    pub fn always_post_notifications(mut self, value: bool) -> Self {
        self.always_post_notifications = value;
        self
    }

    /// Capacity of the private notification center created when no
    /// [`sink`](Self::sink) is given.
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Where broadcast deliveries go.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Broadcast into `center`; subscribe to it to receive notifications.
    pub fn notification_center(self, center: &NotificationCenter) -> Self {
        self.sink(Arc::new(center.clone()))
    }

    /// Replace the platform kernel backend (tests use
    /// [`MockKernel`](crate::kernel::mock::MockKernel)).
    pub fn kernel(mut self, factory: KernelFactory) -> Self {
        self.kernel = Some(factory);
        self
    }

    /// Replace how descriptors are opened (tests use
    /// [`MockFileSystem`](crate::fs::mock::MockFileSystem)).
    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn build(self) -> PathQueue {
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(NotificationCenter::new(self.broadcast_capacity)));

        let shared = Shared {
            id: QueueId::next(),
            registry: Mutex::new(WatchRegistry::new()),
            monitor: Mutex::new(None),
            dispatcher: Dispatcher::new(sink, self.always_post_notifications),
            sleep_interval_nanos: AtomicU64::new(duration_nanos(self.sleep_interval)),
            fs: self.fs.unwrap_or_else(|| Arc::new(RealFileSystem)),
            kernel_factory: self.kernel.unwrap_or_else(platform_factory),
        };
        debug!(queue = %shared.id, "queue created");

        PathQueue {
            shared: Arc::new(shared),
        }
    }
}
