// src/kernel/mock.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use super::{KernelFactory, KernelQueue, PollStatus, RawEvent, Token};
use crate::fs::Descriptor;
use crate::types::EventSet;

/// In-memory kernel handle for tests.
///
/// Tokens are handed out from a counter. Tests push synthetic events with
/// [`emit`](Self::emit) / [`emit_for`](Self::emit_for); the monitor loop
/// picks them up on its next poll. While [`hold`](Self::hold) is active the
/// events stay queued, which lets a test mutate the registry between "the
/// kernel saw it" and "the loop resolved it".
#[derive(Debug, Clone, Default)]
pub struct MockKernel {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<MockKernelState>,
    ready: Condvar,
}

#[derive(Debug, Default)]
struct MockKernelState {
    next_token: u64,
    registrations: HashMap<Token, (PathBuf, EventSet)>,
    last_token: HashMap<PathBuf, Token>,
    pending: VecDeque<RawEvent>,
    held: bool,
    closed: bool,
    handles_opened: usize,
    fail_open: bool,
    fail_register: HashSet<PathBuf>,
    fail_deregister: bool,
    polls: usize,
    issued: Vec<Weak<dyn KernelQueue>>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory handing out this mock as the queue's kernel handle.
    pub fn factory(&self) -> KernelFactory {
        let kernel = self.clone();
        Arc::new(move || {
            let mut state = kernel.inner.state.lock().unwrap();
            if state.fail_open {
                return Err(io::Error::from_raw_os_error(libc::EMFILE));
            }
            state.handles_opened += 1;
            let handle: Arc<dyn KernelQueue> = Arc::new(kernel.clone());
            state.issued.push(Arc::downgrade(&handle));
            Ok(handle)
        })
    }

    /// Queue a synthetic event for `token`.
    pub fn emit(&self, token: Token, events: EventSet) {
        let mut state = self.inner.state.lock().unwrap();
        state.pending.push_back(RawEvent { token, events });
        self.inner.ready.notify_all();
    }

    /// Queue a synthetic event for the most recent registration of `path`,
    /// even if that registration has since been dropped.
    pub fn emit_for(&self, path: impl AsRef<Path>, events: EventSet) -> Option<Token> {
        let token = self.token_for(path)?;
        self.emit(token, events);
        Some(token)
    }

    /// Most recent token assigned to `path`.
    pub fn token_for(&self, path: impl AsRef<Path>) -> Option<Token> {
        let state = self.inner.state.lock().unwrap();
        state.last_token.get(path.as_ref()).copied()
    }

    pub fn is_registered(&self, path: impl AsRef<Path>) -> bool {
        let state = self.inner.state.lock().unwrap();
        state
            .registrations
            .values()
            .any(|(registered, _)| registered == path.as_ref())
    }

    /// Interest flags the queue registered for `path`, if currently registered.
    pub fn interest_for(&self, path: impl AsRef<Path>) -> Option<EventSet> {
        let state = self.inner.state.lock().unwrap();
        state
            .registrations
            .values()
            .find(|(registered, _)| registered == path.as_ref())
            .map(|(_, interest)| *interest)
    }

    pub fn registration_count(&self) -> usize {
        self.inner.state.lock().unwrap().registrations.len()
    }

    /// Keep emitted events queued until [`release`](Self::release).
    pub fn hold(&self) {
        self.inner.state.lock().unwrap().held = true;
    }

    pub fn release(&self) {
        self.inner.state.lock().unwrap().held = false;
        self.inner.ready.notify_all();
    }

    /// Events emitted but not yet handed to the monitor loop.
    pub fn pending_events(&self) -> usize {
        self.inner.state.lock().unwrap().pending.len()
    }

    pub fn handles_opened(&self) -> usize {
        self.inner.state.lock().unwrap().handles_opened
    }

    /// Handles created by the factory that somebody still holds.
    pub fn live_handles(&self) -> usize {
        let state = self.inner.state.lock().unwrap();
        state
            .issued
            .iter()
            .filter(|handle| handle.strong_count() > 0)
            .count()
    }

    pub fn poll_count(&self) -> usize {
        self.inner.state.lock().unwrap().polls
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }

    /// Make the next handle creation fail with `EMFILE`.
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_open = fail;
    }

    pub fn fail_register(&self, path: impl AsRef<Path>) {
        let mut state = self.inner.state.lock().unwrap();
        state.fail_register.insert(path.as_ref().to_path_buf());
    }

    pub fn set_fail_deregister(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_deregister = fail;
    }
}

impl KernelQueue for MockKernel {
    fn register(
        &self,
        _descriptor: &Descriptor,
        path: &Path,
        interest: EventSet,
    ) -> io::Result<Token> {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock kernel closed"));
        }
        if state.fail_register.contains(path) {
            return Err(io::Error::from_raw_os_error(libc::ENOSPC));
        }

        state.next_token += 1;
        let token = Token(state.next_token);
        state
            .registrations
            .insert(token, (path.to_path_buf(), interest));
        state.last_token.insert(path.to_path_buf(), token);
        Ok(token)
    }

    fn deregister(&self, _descriptor: &Descriptor, token: Token) -> io::Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        state.registrations.remove(&token);
        if state.fail_deregister {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        Ok(())
    }

    fn poll(&self, timeout: Duration, events: &mut Vec<RawEvent>) -> io::Result<PollStatus> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock().unwrap();
        state.polls += 1;

        loop {
            if state.closed {
                return Ok(PollStatus::Closed);
            }
            if !state.held && !state.pending.is_empty() {
                events.extend(state.pending.drain(..));
                return Ok(PollStatus::Ready);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(PollStatus::Ready);
            }
            let (guard, _) = self
                .inner
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
    }

    fn close(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.closed = true;
        self.inner.ready.notify_all();
    }
}
