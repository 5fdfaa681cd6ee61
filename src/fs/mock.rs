// src/fs/mock.rs

use super::{Descriptor, FileSystem};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the real filesystem.
///
/// Every path opens successfully (backed by `/dev/null`) unless a failure was
/// configured for it, or the descriptor limit has been reached. Handed-out
/// descriptors are counted until they are dropped; clones share the count.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    live: Arc<AtomicUsize>,
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    failures: HashMap<PathBuf, i32>,
    descriptor_limit: Option<usize>,
    opened: Vec<PathBuf>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every open of `path` fail with the given `errno`.
    pub fn fail_path(&self, path: impl AsRef<Path>, errno: i32) {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(path.as_ref().to_path_buf(), errno);
    }

    /// Undo [`fail_path`](Self::fail_path).
    pub fn heal_path(&self, path: impl AsRef<Path>) {
        let mut state = self.state.lock().unwrap();
        state.failures.remove(path.as_ref());
    }

    /// Fail opens with `EMFILE` once `limit` descriptors are live.
    pub fn set_descriptor_limit(&self, limit: Option<usize>) {
        self.state.lock().unwrap().descriptor_limit = limit;
    }

    /// Number of descriptors handed out and not yet closed.
    pub fn live_descriptors(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Every path that was opened successfully, in order.
    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().opened.clone()
    }
}

impl FileSystem for MockFileSystem {
    fn open_descriptor(&self, path: &Path) -> io::Result<Descriptor> {
        let mut state = self.state.lock().unwrap();

        if let Some(errno) = state.failures.get(path) {
            return Err(io::Error::from_raw_os_error(*errno));
        }
        if let Some(limit) = state.descriptor_limit {
            if self.live_descriptors() >= limit {
                return Err(io::Error::from_raw_os_error(libc::EMFILE));
            }
        }

        let file = File::open("/dev/null")?;
        state.opened.push(path.to_path_buf());
        Ok(Descriptor::leased(file, Arc::clone(&self.live)))
    }
}
