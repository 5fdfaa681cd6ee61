// src/watch/snapshot.rs

//! `fstat` snapshots used to derive events the kernel does not report.
//!
//! inotify has no equivalent of kqueue's `NOTE_EXTEND` / `NOTE_LINK`, and
//! `IN_DELETE_SELF` never fires while the queue itself keeps the file open.
//! Each entry remembers the last stat of its descriptor; when the kernel
//! reports activity we stat again and compare.

use std::fs::Metadata;
use std::io;
use std::os::unix::fs::MetadataExt;

use crate::fs::Descriptor;
use crate::types::EventSet;

/// The parts of `struct stat` that event refinement looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileSnapshot {
    pub size: u64,
    pub nlink: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl FileSnapshot {
    pub fn capture(descriptor: &Descriptor) -> io::Result<Self> {
        descriptor.stat().map(|meta| Self::from(&meta))
    }
}

impl From<&Metadata> for FileSnapshot {
    fn from(meta: &Metadata) -> Self {
        Self {
            size: meta.size(),
            nlink: meta.nlink(),
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }
}

/// Add the events implied by the change from `before` to `after`.
///
/// - growth adds `SIZE_INCREASE`
/// - a different link count adds `LINK_COUNT_CHANGED`, and `DELETE` once it
///   reaches zero
/// - an attribute event whose only visible cause is the link count is not
///   reported as `ATTRIBUTE_CHANGE`
pub fn refine(events: EventSet, before: &FileSnapshot, after: &FileSnapshot) -> EventSet {
    let mut refined = events;

    if after.size > before.size {
        refined |= EventSet::SIZE_INCREASE;
    }

    if after.nlink != before.nlink {
        refined |= EventSet::LINK_COUNT_CHANGED;
        if after.nlink == 0 {
            refined |= EventSet::DELETE;
        }

        let same_attributes =
            after.mode == before.mode && after.uid == before.uid && after.gid == before.gid;
        if same_attributes {
            refined.remove(EventSet::ATTRIBUTE_CHANGE);
        }
    }

    refined
}
