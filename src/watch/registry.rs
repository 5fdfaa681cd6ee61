// src/watch/registry.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::errors::{PathQueueError, Result};
use crate::fs::Descriptor;
use crate::kernel::{KernelFactory, KernelQueue, RawEvent, Token};
use crate::types::EventSet;
use crate::watch::snapshot::{FileSnapshot, refine};

/// Result of a successful add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new entry was created.
    Added,
    /// The path was already watched; nothing changed (flags included).
    AlreadyWatched,
}

/// A watched path: its open descriptor, interest flags and kernel token.
#[derive(Debug)]
pub struct WatchEntry {
    path: PathBuf,
    descriptor: Descriptor,
    interest: EventSet,
    token: Token,
    snapshot: Option<FileSnapshot>,
}

impl WatchEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interest(&self) -> EventSet {
        self.interest
    }

    pub fn token(&self) -> Token {
        self.token
    }
}

/// Path -> entry mapping plus the token -> paths reverse index, together
/// with the kernel handle they are registered against.
///
/// The registry is not synchronised itself; the queue keeps it behind one
/// mutex that the monitor loop also takes when resolving tokens, so the
/// kernel handle, the map and the set of open descriptors always change
/// together.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    kernel: Option<Arc<dyn KernelQueue>>,
    entries: HashMap<PathBuf, WatchEntry>,
    by_token: HashMap<Token, Vec<PathBuf>>,
    closed: bool,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn entry(&self, path: &Path) -> Option<&WatchEntry> {
        self.entries.get(path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    /// The kernel handle, if one has been opened.
    pub fn kernel(&self) -> Option<Arc<dyn KernelQueue>> {
        self.kernel.clone()
    }

    /// Return the kernel handle, opening it on first use.
    fn kernel_or_open(&mut self, factory: &KernelFactory) -> Result<Arc<dyn KernelQueue>> {
        if self.closed {
            return Err(PathQueueError::Closed);
        }
        if let Some(kernel) = &self.kernel {
            return Ok(Arc::clone(kernel));
        }

        let kernel = factory().map_err(PathQueueError::KernelOpen)?;
        debug!(?kernel, "kernel event handle opened");
        self.kernel = Some(Arc::clone(&kernel));
        Ok(kernel)
    }

    /// Register `descriptor` for `path` and insert the entry.
    ///
    /// On any failure the descriptor is dropped (closed) before returning,
    /// so the registry is left exactly as it was.
    pub fn insert(
        &mut self,
        path: &Path,
        descriptor: Descriptor,
        interest: EventSet,
        factory: &KernelFactory,
    ) -> Result<AddOutcome> {
        if self.entries.contains_key(path) {
            return Ok(AddOutcome::AlreadyWatched);
        }

        let kernel = self.kernel_or_open(factory)?;

        let token = kernel
            .register(&descriptor, path, interest)
            .map_err(|source| PathQueueError::Register {
                path: path.to_path_buf(),
                source,
            })?;

        let snapshot = if kernel.needs_stat_refinement() {
            match FileSnapshot::capture(&descriptor) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "fstat failed; size and link events disabled for this path");
                    None
                }
            }
        } else {
            None
        };

        self.by_token
            .entry(token)
            .or_default()
            .push(path.to_path_buf());
        self.entries.insert(
            path.to_path_buf(),
            WatchEntry {
                path: path.to_path_buf(),
                descriptor,
                interest,
                token,
                snapshot,
            },
        );

        debug!(path = %path.display(), ?token, ?interest, "watch added");
        Ok(AddOutcome::Added)
    }

    /// Remove `path`, deregistering and closing its descriptor.
    ///
    /// Returns false if the path was not watched.
    pub fn remove(&mut self, path: &Path) -> bool {
        let Some(entry) = self.entries.remove(path) else {
            return false;
        };

        let last_for_token = match self.by_token.get_mut(&entry.token) {
            Some(paths) => {
                paths.retain(|p| p != path);
                paths.is_empty()
            }
            None => true,
        };
        if last_for_token {
            self.by_token.remove(&entry.token);
            if let Some(kernel) = &self.kernel {
                if let Err(err) = kernel.deregister(&entry.descriptor, entry.token) {
                    debug!(path = %path.display(), token = ?entry.token, error = %err, "kernel deregistration failed");
                }
            }
        }

        // Closing happens here whether or not deregistration succeeded.
        drop(entry);

        debug!(path = %path.display(), "watch removed");
        true
    }

    /// Remove every entry. Returns how many were removed.
    pub fn remove_all(&mut self) -> usize {
        let paths: Vec<PathBuf> = self.entries.keys().cloned().collect();
        paths.iter().filter(|path| self.remove(path)).count()
    }

    /// Remove everything and close the kernel handle for good.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let removed = self.remove_all();
        // The monitor holds its own reference and drops it once it sees the
        // handle closed.
        if let Some(kernel) = self.kernel.take() {
            kernel.close();
        }
        debug!(removed, "registry closed");
    }

    /// Resolve a raw kernel event to the watched paths it concerns.
    ///
    /// Unknown tokens (the entry was removed after the kernel queued the
    /// event) resolve to nothing. Each match is masked with the entry's
    /// interest; empty results are skipped.
    pub fn resolve(&mut self, event: RawEvent, refine_with_stat: bool, out: &mut Vec<(PathBuf, EventSet)>) {
        let Some(paths) = self.by_token.get(&event.token) else {
            trace!(token = ?event.token, "dropping event for unknown token");
            return;
        };

        for path in paths {
            let Some(entry) = self.entries.get_mut(path) else {
                continue;
            };

            let mut events = event.events;
            if refine_with_stat {
                if let Some(before) = entry.snapshot {
                    match FileSnapshot::capture(&entry.descriptor) {
                        Ok(after) => {
                            events = refine(events, &before, &after);
                            entry.snapshot = Some(after);
                        }
                        Err(err) => {
                            trace!(path = %path.display(), error = %err, "fstat failed during refinement");
                        }
                    }
                }
            }

            let events = events & entry.interest;
            if events.is_empty() {
                trace!(path = %path.display(), raw = ?event.events, "event outside interest set");
                continue;
            }
            out.push((path.clone(), events));
        }
    }
}
