// src/watch/mod.rs

//! Watch bookkeeping and the monitor loop.
//!
//! This module is responsible for:
//! - The registry of watched paths, their descriptors and kernel tokens.
//! - The background loop that polls the kernel handle and resolves what it
//!   returns back to watched paths.
//! - `fstat` snapshots that fill in events the kernel backend cannot report.
//!
//! It does **not** decide who hears about an event; resolved events go to
//! the dispatcher.

pub(crate) mod monitor;
pub mod registry;
pub mod snapshot;

pub use registry::{AddOutcome, WatchEntry, WatchRegistry};
pub use snapshot::{FileSnapshot, refine};
