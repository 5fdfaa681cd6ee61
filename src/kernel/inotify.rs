// src/kernel/inotify.rs

//! Linux backend built on `inotify`.
//!
//! inotify watches are keyed by inode, not by descriptor, and two paths that
//! are hard links to one inode get the same watch descriptor back. Tokens are
//! therefore allocated per watch descriptor, and the registry is responsible
//! for only dropping the registration once its last path is gone.
//!
//! A single `write(2)` on Linux can raise several `IN_MODIFY` records (an
//! `O_TRUNC` open followed by the write, for instance). After the first
//! wakeup the backend keeps reading for short windows and merges adjacent
//! duplicates, so a burst normally surfaces as one event. Writes separated
//! by pauses longer than the window are still reported separately.

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask, Watches};
use tracing::{debug, trace, warn};

use super::{KernelQueue, PollStatus, RawEvent, Token};
use crate::fs::Descriptor;
use crate::types::EventSet;

const EVENT_BUFFER_LEN: usize = 4096;

/// How long a burst may pause before it counts as finished.
const COALESCE_WINDOW: Duration = Duration::from_millis(10);
/// Upper bound on extra reads per poll, so a steady stream still gets
/// delivered.
const MAX_COALESCE_ROUNDS: usize = 8;

/// Every watch asks for everything; interest filtering happens per entry in
/// the monitor loop, because a second registration of the same inode would
/// otherwise replace the first one's mask.
fn watch_mask() -> WatchMask {
    WatchMask::MODIFY
        | WatchMask::ATTRIB
        | WatchMask::MOVE_SELF
        | WatchMask::DELETE_SELF
        | WatchMask::CREATE
        | WatchMask::DELETE
        | WatchMask::MOVED_FROM
        | WatchMask::MOVED_TO
}

/// Translate an inotify mask into the public vocabulary.
///
/// Changes to a watched directory's entries count as a write of the
/// directory.
fn translate(mask: EventMask) -> EventSet {
    let mut events = EventSet::empty();
    if mask.contains(EventMask::MOVE_SELF) {
        events |= EventSet::RENAME;
    }
    if mask.intersects(
        EventMask::MODIFY
            | EventMask::CREATE
            | EventMask::DELETE
            | EventMask::MOVED_FROM
            | EventMask::MOVED_TO,
    ) {
        events |= EventSet::WRITE;
    }
    if mask.contains(EventMask::DELETE_SELF) {
        events |= EventSet::DELETE;
    }
    if mask.contains(EventMask::ATTRIB) {
        events |= EventSet::ATTRIBUTE_CHANGE;
    }
    if mask.contains(EventMask::UNMOUNT) {
        events |= EventSet::ACCESS_REVOCATION;
    }
    events
}

/// Wait until the inotify descriptor is readable. Returns false on timeout.
fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: `pollfd` is a valid, exclusively borrowed array of length 1 and
    // the caller keeps `fd` open for the duration of the call.
    let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if ready < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ready > 0)
}

/// Collapse records appended after `start` that repeat the record right
/// before them (same token, same events).
fn coalesce(events: &mut Vec<RawEvent>, start: usize) {
    let mut burst = events.split_off(start);
    burst.dedup();
    events.append(&mut burst);
}

/// What to hand `inotify_add_watch` for an open descriptor.
///
/// inotify watches whatever a path resolves to at the time of the call, so
/// registering `path` again could land on a different inode than the one
/// that was opened if the file was replaced in between. The descriptor's
/// `/proc/self/fd` link always resolves to the opened inode. Without procfs
/// the path is used and that window stays open.
fn watch_target(descriptor: &Descriptor, path: &Path) -> PathBuf {
    if Path::new("/proc/self/fd").is_dir() {
        PathBuf::from(format!("/proc/self/fd/{}", descriptor.as_raw_fd()))
    } else {
        path.to_path_buf()
    }
}

struct Reader {
    inotify: Inotify,
    buffer: [u8; EVENT_BUFFER_LEN],
}

#[derive(Default)]
struct TokenMap {
    next: u64,
    by_wd: HashMap<WatchDescriptor, Token>,
    by_token: HashMap<Token, WatchDescriptor>,
}

impl TokenMap {
    fn token_for(&mut self, wd: WatchDescriptor) -> Token {
        if let Some(token) = self.by_wd.get(&wd) {
            return *token;
        }
        self.next += 1;
        let token = Token(self.next);
        self.by_wd.insert(wd.clone(), token);
        self.by_token.insert(token, wd);
        token
    }

    fn forget_token(&mut self, token: Token) -> Option<WatchDescriptor> {
        let wd = self.by_token.remove(&token)?;
        self.by_wd.remove(&wd);
        Some(wd)
    }

    fn forget_wd(&mut self, wd: &WatchDescriptor) {
        if let Some(token) = self.by_wd.remove(wd) {
            self.by_token.remove(&token);
        }
    }
}

/// One inotify instance shared by every watch of a queue.
pub struct InotifyQueue {
    reader: Mutex<Reader>,
    watches: Mutex<Watches>,
    tokens: Mutex<TokenMap>,
    closed: AtomicBool,
}

impl std::fmt::Debug for InotifyQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InotifyQueue")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl InotifyQueue {
    pub fn open() -> io::Result<Self> {
        let inotify = Inotify::init()?;
        let watches = inotify.watches();
        debug!(fd = inotify.as_raw_fd(), "opened inotify instance");

        Ok(Self {
            reader: Mutex::new(Reader {
                inotify,
                buffer: [0; EVENT_BUFFER_LEN],
            }),
            watches: Mutex::new(watches),
            tokens: Mutex::new(TokenMap::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Read every queued inotify event and append the translated ones.
    fn drain(&self, reader: &mut Reader, events: &mut Vec<RawEvent>) -> io::Result<()> {
        loop {
            let batch = match reader.inotify.read_events(&mut reader.buffer) {
                Ok(batch) => batch,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err),
            };

            let mut read_any = false;
            for event in batch {
                read_any = true;

                if event.mask.contains(EventMask::Q_OVERFLOW) {
                    warn!("inotify queue overflowed; some events were lost");
                    continue;
                }
                if event.mask.contains(EventMask::IGNORED) {
                    // The kernel dropped this watch; its number may be reused.
                    self.lock_tokens().forget_wd(&event.wd);
                    continue;
                }

                let Some(token) = self.lock_tokens().by_wd.get(&event.wd).copied() else {
                    trace!(mask = ?event.mask, "event for unknown watch descriptor");
                    continue;
                };

                let translated = translate(event.mask);
                if !translated.is_empty() {
                    events.push(RawEvent {
                        token,
                        events: translated,
                    });
                }
            }

            if !read_any {
                return Ok(());
            }
        }
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, TokenMap> {
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KernelQueue for InotifyQueue {
    fn register(
        &self,
        descriptor: &Descriptor,
        path: &Path,
        _interest: EventSet,
    ) -> io::Result<Token> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "inotify handle closed"));
        }

        let target = watch_target(descriptor, path);
        let wd = {
            let mut watches = self
                .watches
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            watches.add(&target, watch_mask())?
        };

        let token = self.lock_tokens().token_for(wd);
        trace!(path = %path.display(), ?token, "inotify watch added");
        Ok(token)
    }

    fn deregister(&self, _descriptor: &Descriptor, token: Token) -> io::Result<()> {
        let Some(wd) = self.lock_tokens().forget_token(token) else {
            // Already released by the kernel (IN_IGNORED).
            return Ok(());
        };

        let mut watches = self
            .watches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        watches.remove(wd)
    }

    fn poll(&self, timeout: Duration, events: &mut Vec<RawEvent>) -> io::Result<PollStatus> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(PollStatus::Closed);
        }

        let mut guard = self
            .reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let reader = &mut *guard;
        let fd = reader.inotify.as_raw_fd();

        let ready = wait_readable(fd, timeout)?;
        if self.closed.load(Ordering::Acquire) {
            return Ok(PollStatus::Closed);
        }
        if !ready {
            return Ok(PollStatus::Ready);
        }

        let start = events.len();
        self.drain(reader, events)?;

        // A truncate followed by a write usually straddles two reads; collect
        // the rest of the burst before handing anything out.
        for _ in 0..MAX_COALESCE_ROUNDS {
            match wait_readable(fd, COALESCE_WINDOW) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    trace!(error = %err, "coalescing wait failed");
                    break;
                }
            }
            if let Err(err) = self.drain(reader, events) {
                trace!(error = %err, "coalescing read failed");
                break;
            }
        }
        coalesce(events, start);

        Ok(PollStatus::Ready)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("inotify handle closed");
        }
    }

    fn needs_stat_refinement(&self) -> bool {
        true
    }
}
