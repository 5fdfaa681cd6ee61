// src/dispatch/dispatcher.rs

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{error, trace};

use crate::dispatch::notification::{Notification, NotificationSink};
use crate::engine::PathQueue;
use crate::types::{EventSet, QueueEvent};

/// Single consumer of queue events.
///
/// Implementing the trait is the whole contract: there is exactly one
/// method and the compiler guarantees it exists, so the dispatcher calls it
/// without any capability check.
///
/// Callbacks run on the queue's monitor thread with no internal lock held,
/// so they may call back into `queue` (the usual reaction to an event is
/// `remove_path` followed by `add_path`, see [`PathQueue`]). Slow callbacks
/// delay every later event of the queue.
pub trait EventDelegate: Send + Sync {
    fn on_event(&self, queue: &PathQueue, event: QueueEvent, path: &Path);
}

/// Turns an event bitmask into individual deliveries.
#[derive(Debug)]
pub struct Dispatcher {
    delegate: RwLock<Option<Weak<dyn EventDelegate>>>,
    always_post: AtomicBool,
    sink: Arc<dyn NotificationSink>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, always_post: bool) -> Self {
        Self {
            delegate: RwLock::new(None),
            always_post: AtomicBool::new(always_post),
            sink,
        }
    }

    /// Install `delegate`. Only a weak reference is kept, so a delegate that
    /// owns its queue does not keep itself alive.
    pub fn set_delegate<D: EventDelegate + 'static>(&self, delegate: &Arc<D>) {
        let weak = Arc::downgrade(delegate);
        let weak: Weak<dyn EventDelegate> = weak;
        *self
            .delegate
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(weak);
    }

    pub fn clear_delegate(&self) {
        *self
            .delegate
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    /// The delegate, if one is set and still alive.
    pub fn delegate(&self) -> Option<Arc<dyn EventDelegate>> {
        self.delegate
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    pub fn always_post(&self) -> bool {
        self.always_post.load(Ordering::Acquire)
    }

    pub fn set_always_post(&self, value: bool) {
        self.always_post.store(value, Ordering::Release);
    }

    /// Deliver every event in `events` for `path`, in
    /// [`QueueEvent::ORDERED`] order.
    pub fn dispatch(&self, queue: &PathQueue, path: &Path, events: EventSet) {
        for event in events.events() {
            self.deliver(queue, path, event);
        }
    }

    fn deliver(&self, queue: &PathQueue, path: &Path, event: QueueEvent) {
        let delegate = self.delegate();

        if let Some(delegate) = &delegate {
            trace!(%event, path = %path.display(), "delivering to delegate");
            let outcome = catch_unwind(AssertUnwindSafe(|| delegate.on_event(queue, event, path)));
            if outcome.is_err() {
                error!(%event, path = %path.display(), "event delegate panicked");
            }
        }

        if delegate.is_none() || self.always_post() {
            trace!(%event, path = %path.display(), "posting notification");
            self.sink.publish(
                event.topic(),
                Notification {
                    event,
                    source: queue.id(),
                    path: path.to_path_buf(),
                },
            );
        }
    }
}
