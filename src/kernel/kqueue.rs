// src/kernel/kqueue.rs

//! macOS/BSD backend built on `kqueue(2)` with `EVFILT_VNODE` filters.
//!
//! Every watched descriptor is registered against one kqueue; the descriptor
//! number doubles as the registration token. kqueue reports all seven event
//! kinds natively.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use super::{KernelQueue, PollStatus, RawEvent, Token};
use crate::fs::Descriptor;
use crate::types::EventSet;

const EVENT_BATCH: usize = 64;

fn to_note_flags(interest: EventSet) -> u32 {
    let mut flags = 0;
    if interest.contains(EventSet::RENAME) {
        flags |= libc::NOTE_RENAME;
    }
    if interest.contains(EventSet::WRITE) {
        flags |= libc::NOTE_WRITE;
    }
    if interest.contains(EventSet::DELETE) {
        flags |= libc::NOTE_DELETE;
    }
    if interest.contains(EventSet::ATTRIBUTE_CHANGE) {
        flags |= libc::NOTE_ATTRIB;
    }
    if interest.contains(EventSet::SIZE_INCREASE) {
        flags |= libc::NOTE_EXTEND;
    }
    if interest.contains(EventSet::LINK_COUNT_CHANGED) {
        flags |= libc::NOTE_LINK;
    }
    if interest.contains(EventSet::ACCESS_REVOCATION) {
        flags |= libc::NOTE_REVOKE;
    }
    flags
}

fn from_note_flags(flags: u32) -> EventSet {
    let mut events = EventSet::empty();
    if flags & libc::NOTE_RENAME != 0 {
        events |= EventSet::RENAME;
    }
    if flags & libc::NOTE_WRITE != 0 {
        events |= EventSet::WRITE;
    }
    if flags & libc::NOTE_DELETE != 0 {
        events |= EventSet::DELETE;
    }
    if flags & libc::NOTE_ATTRIB != 0 {
        events |= EventSet::ATTRIBUTE_CHANGE;
    }
    if flags & libc::NOTE_EXTEND != 0 {
        events |= EventSet::SIZE_INCREASE;
    }
    if flags & libc::NOTE_LINK != 0 {
        events |= EventSet::LINK_COUNT_CHANGED;
    }
    if flags & libc::NOTE_REVOKE != 0 {
        events |= EventSet::ACCESS_REVOCATION;
    }
    events
}

/// One kqueue shared by every watch of a queue.
#[derive(Debug)]
pub struct KqueueQueue {
    kq: OwnedFd,
    closed: AtomicBool,
}

impl KqueueQueue {
    pub fn open() -> io::Result<Self> {
        // SAFETY: plain syscall without pointer arguments.
        let fd = unsafe { libc::kqueue() };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` was just returned by kqueue() and is owned by nobody else.
        let kq = unsafe { OwnedFd::from_raw_fd(fd) };
        debug!(fd, "opened kqueue");

        Ok(Self {
            kq,
            closed: AtomicBool::new(false),
        })
    }

    fn apply_change(&self, ident: usize, flags: u16, fflags: u32) -> io::Result<()> {
        // SAFETY: an all-zero kevent is a valid value; the fields we rely on
        // are filled in below.
        let mut change: libc::kevent = unsafe { std::mem::zeroed() };
        change.ident = ident as _;
        change.filter = libc::EVFILT_VNODE;
        change.flags = flags;
        change.fflags = fflags;

        // SAFETY: `change` points to exactly one initialised kevent and no
        // output buffer is passed.
        let rc = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                &change,
                1,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl KernelQueue for KqueueQueue {
    fn register(
        &self,
        descriptor: &Descriptor,
        path: &Path,
        interest: EventSet,
    ) -> io::Result<Token> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "kqueue handle closed"));
        }

        let fd = descriptor.as_raw_fd();
        self.apply_change(
            fd as usize,
            libc::EV_ADD | libc::EV_ENABLE | libc::EV_CLEAR,
            to_note_flags(interest),
        )?;
        trace!(path = %path.display(), fd, "kqueue vnode filter added");
        Ok(Token(fd as u64))
    }

    fn deregister(&self, descriptor: &Descriptor, _token: Token) -> io::Result<()> {
        self.apply_change(descriptor.as_raw_fd() as usize, libc::EV_DELETE, 0)
    }

    fn poll(&self, timeout: Duration, events: &mut Vec<RawEvent>) -> io::Result<PollStatus> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(PollStatus::Closed);
        }

        // SAFETY: all-zero kevents are valid placeholders for kernel output.
        let mut batch: [libc::kevent; EVENT_BATCH] = unsafe { std::mem::zeroed() };
        let ts = libc::timespec {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as _,
        };

        // SAFETY: `batch` has room for EVENT_BATCH entries and `ts` outlives
        // the call.
        let n = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                ptr::null(),
                0,
                batch.as_mut_ptr(),
                EVENT_BATCH as _,
                &ts,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if self.closed.load(Ordering::Acquire) {
            return Ok(PollStatus::Closed);
        }

        for raw in batch.iter().take(n as usize) {
            let translated = from_note_flags(raw.fflags);
            if !translated.is_empty() {
                events.push(RawEvent {
                    token: Token(raw.ident as u64),
                    events: translated,
                });
            }
        }

        Ok(PollStatus::Ready)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("kqueue handle closed");
        }
    }
}
