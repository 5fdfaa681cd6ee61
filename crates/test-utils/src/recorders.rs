use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pathqueue::{EventDelegate, Notification, NotificationSink, PathQueue, QueueEvent, QueueId};

/// One delegate invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateCall {
    pub queue: QueueId,
    pub event: QueueEvent,
    pub path: PathBuf,
}

/// A delegate that records every call it receives.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    calls: Mutex<Vec<DelegateCall>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<DelegateCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<QueueEvent> {
        self.calls().into_iter().map(|c| c.event).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_of(&self, event: QueueEvent) -> usize {
        self.calls().iter().filter(|c| c.event == event).count()
    }
}

impl EventDelegate for RecordingDelegate {
    fn on_event(&self, queue: &PathQueue, event: QueueEvent, path: &Path) {
        self.calls.lock().unwrap().push(DelegateCall {
            queue: queue.id(),
            event,
            path: path.to_path_buf(),
        });
    }
}

/// A broadcast sink that records every publish call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, Notification)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published(&self) -> Vec<(String, Notification)> {
        self.published.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published().into_iter().map(|(topic, _)| topic).collect()
    }

    pub fn len(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, topic: &'static str, notification: Notification) {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), notification));
    }
}
