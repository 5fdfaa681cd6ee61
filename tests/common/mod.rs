#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pathqueue::PathQueue;
use pathqueue::fs::mock::MockFileSystem;
use pathqueue::kernel::mock::MockKernel;

pub use pathqueue_test_utils::recorders::{DelegateCall, RecordingDelegate, RecordingSink};
pub use pathqueue_test_utils::{init_tracing, wait_until, with_timeout};

/// How long tests wait for an asynchronous delivery.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll timeout for queues under test; short so teardown is quick.
pub const TEST_SLEEP_INTERVAL: Duration = Duration::from_millis(20);

/// A queue wired to the mock kernel, the mock filesystem and a recording sink.
pub struct MockHarness {
    pub queue: PathQueue,
    pub kernel: MockKernel,
    pub fs: MockFileSystem,
    pub sink: Arc<RecordingSink>,
}

pub fn mock_harness() -> MockHarness {
    init_tracing();

    let kernel = MockKernel::new();
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();

    let queue = PathQueue::builder()
        .kernel(kernel.factory())
        .file_system(Arc::new(fs.clone()))
        .sink(sink.clone())
        .sleep_interval(TEST_SLEEP_INTERVAL)
        .build();

    MockHarness {
        queue,
        kernel,
        fs,
        sink,
    }
}
