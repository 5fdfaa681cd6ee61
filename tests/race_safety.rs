mod common;
use crate::common::{DELIVERY_TIMEOUT, mock_harness, wait_until};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use pathqueue::{EventDelegate, EventSet, PathQueue, QueueEvent};

const A: &str = "/tmp/a.txt";
const SENTINEL: &str = "/tmp/sentinel.txt";

#[test]
fn event_queued_before_removal_is_dropped() {
    let h = mock_harness();
    h.queue.add_path(A);
    h.queue.add_path(SENTINEL);

    h.kernel.hold();
    h.kernel.emit_for(A, EventSet::WRITE).expect("registered");
    h.queue.remove_path(A);
    h.kernel.emit_for(SENTINEL, EventSet::WRITE).expect("registered");
    assert_eq!(h.kernel.pending_events(), 2);
    h.kernel.release();

    // The sentinel comes after the stale event, so once it is delivered the
    // stale one has been resolved too.
    assert!(wait_until(DELIVERY_TIMEOUT, || h.sink.len() == 1));
    let published = h.sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1.path, PathBuf::from(SENTINEL));
}

#[test]
fn stale_event_does_not_reach_a_re_added_entry() {
    let h = mock_harness();
    h.queue.add_path(A);
    h.queue.add_path(SENTINEL);

    h.kernel.hold();
    let stale = h.kernel.emit_for(A, EventSet::DELETE).expect("registered");
    h.queue.remove_path(A);
    h.queue.add_path(A);
    assert_ne!(h.kernel.token_for(A), Some(stale));
    h.kernel.emit_for(SENTINEL, EventSet::WRITE).expect("registered");
    h.kernel.release();

    assert!(wait_until(DELIVERY_TIMEOUT, || h.sink.len() == 1));
    assert_eq!(h.sink.published()[0].1.path, PathBuf::from(SENTINEL));
    assert!(h.queue.is_watching(A));
}

#[test]
fn remove_all_while_events_are_pending() {
    let h = mock_harness();
    for name in ["a", "b", "c"] {
        h.queue.add_path(format!("/tmp/{name}.txt"));
    }

    h.kernel.hold();
    for name in ["a", "b", "c"] {
        h.kernel
            .emit_for(format!("/tmp/{name}.txt"), EventSet::ALL)
            .expect("registered");
    }
    h.queue.remove_all_paths();
    h.queue.add_path(SENTINEL);
    h.kernel.emit_for(SENTINEL, EventSet::RENAME).expect("registered");
    h.kernel.release();

    assert!(wait_until(DELIVERY_TIMEOUT, || h.sink.len() == 1));
    assert_eq!(h.sink.topics(), vec!["Rename".to_string()]);
    assert_eq!(h.fs.live_descriptors(), 1);
}

#[test]
fn removing_a_path_while_its_event_is_being_delivered() {
    let h = mock_harness();
    h.queue.add_path(A);

    h.kernel.emit_for(A, EventSet::WRITE).expect("registered");
    h.queue.remove_path(A);

    // Whichever side wins, at most one delivery happens and nothing leaks.
    thread::sleep(Duration::from_millis(100));
    assert!(h.sink.len() <= 1);
    assert_eq!(h.fs.live_descriptors(), 0);
}

/// Calls back into the queue from every delivery.
struct Inspector {
    delivered: AtomicUsize,
}

impl EventDelegate for Inspector {
    fn on_event(&self, queue: &PathQueue, _event: QueueEvent, path: &Path) {
        let _ = queue.is_watching(path);
        let _ = queue.number_of_watched_paths();
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn concurrent_adds_removes_and_events_do_not_deadlock_or_leak() {
    let h = mock_harness();
    let delegate = Arc::new(Inspector {
        delivered: AtomicUsize::new(0),
    });
    h.queue.set_delegate(&delegate);
    h.queue.add_path(SENTINEL);

    let paths: Arc<Vec<PathBuf>> = Arc::new(
        (0..8)
            .map(|i| PathBuf::from(format!("/tmp/stress-{i}.txt")))
            .collect(),
    );
    let stop = Arc::new(AtomicBool::new(false));

    let mut workers = Vec::new();
    for worker in 0..4 {
        let queue = h.queue.clone();
        let paths = Arc::clone(&paths);
        let stop = Arc::clone(&stop);
        workers.push(thread::spawn(move || {
            let mut i = worker;
            while !stop.load(Ordering::SeqCst) {
                let path = &paths[i % paths.len()];
                if i % 3 == 0 {
                    queue.remove_path(path);
                } else {
                    queue.add_path(path);
                }
                i += 1;
            }
        }));
    }

    let emitter = {
        let kernel = h.kernel.clone();
        let paths = Arc::clone(&paths);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut i = 0;
            while !stop.load(Ordering::SeqCst) {
                kernel.emit_for(&paths[i % paths.len()], EventSet::WRITE);
                i += 1;
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    thread::sleep(Duration::from_millis(300));
    stop.store(true, Ordering::SeqCst);
    for worker in workers {
        worker.join().expect("worker panicked");
    }
    emitter.join().expect("emitter panicked");

    // The monitor is still alive and delivering.
    let before = delegate.delivered.load(Ordering::SeqCst);
    h.kernel.emit_for(SENTINEL, EventSet::WRITE).expect("registered");
    assert!(wait_until(DELIVERY_TIMEOUT, || {
        delegate.delivered.load(Ordering::SeqCst) > before
    }));

    assert_eq!(h.fs.live_descriptors(), h.queue.number_of_watched_paths());
    h.queue.remove_all_paths();
    assert_eq!(h.fs.live_descriptors(), 0);
    assert_eq!(h.kernel.registration_count(), 0);
}
