// src/errors.rs

//! Crate-wide error type.
//!
//! Most queue operations swallow failures by contract (a path that cannot be
//! opened is simply not watched). The typed variants exist for the
//! `try_*` entry points and for the configuration layer.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathQueueError {
    #[error("could not open {path:?} for watching: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create kernel event handle: {0}")]
    KernelOpen(#[source] std::io::Error),

    #[error("kernel refused to watch {path:?}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("queue has been closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PathQueueError {
    /// True when the failure was the process (or system) running out of
    /// file descriptors.
    pub fn is_descriptor_exhaustion(&self) -> bool {
        match self {
            PathQueueError::Open { source, .. } | PathQueueError::KernelOpen(source) => {
                matches!(source.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
            }
            _ => false,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PathQueueError>;
