// src/fs/mod.rs

//! Descriptor acquisition.
//!
//! The registry never calls `open(2)` directly; it goes through a
//! [`FileSystem`] so tests can force failures (descriptor exhaustion,
//! missing files) and count how many descriptors are live.

use std::fmt::{self, Debug};
use std::fs::{self, File, Metadata};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod mock;

/// Read-only OS handle kept open for as long as a path is watched.
///
/// Dropping the descriptor closes it. Descriptors are owned by exactly one
/// watch entry and are never duplicated.
pub struct Descriptor {
    file: File,
    _lease: Option<Lease>,
}

/// Counts a descriptor as live in a shared counter until it is dropped.
struct Lease(Arc<AtomicUsize>);

impl Lease {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Lease(counter)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Descriptor {
    pub fn new(file: File) -> Self {
        Self { file, _lease: None }
    }

    /// Descriptor counted in `live` while it stays open.
    pub(crate) fn leased(file: File, live: Arc<AtomicUsize>) -> Self {
        Self {
            file,
            _lease: Some(Lease::acquire(live)),
        }
    }

    /// `fstat(2)` on the open handle. This keeps describing the original
    /// inode even after the path has been replaced.
    pub fn stat(&self) -> io::Result<Metadata> {
        self.file.metadata()
    }
}

impl AsFd for Descriptor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Descriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

/// Abstract source of watch descriptors.
pub trait FileSystem: Send + Sync + Debug {
    /// Open a read-only descriptor suitable for event registration.
    fn open_descriptor(&self, path: &Path) -> io::Result<Descriptor>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn open_descriptor(&self, path: &Path) -> io::Result<Descriptor> {
        let mut options = fs::OpenOptions::new();
        options.read(true);

        // Event-only descriptors do not keep the volume from unmounting.
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_EVTONLY);
        }

        options.open(path).map(Descriptor::new)
    }
}
