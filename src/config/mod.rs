// src/config/mod.rs

//! Configuration loading and validation for pathqueue.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into typed settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, QueueSettings, RawConfigFile, RawQueueSection, RawWatchSection, WatchSettings,
};
pub use validate::{parse_duration, validate_config};
