//! Core types, configuration, and errors for dirwatch.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - [`ChangeKind`] and [`EventKindSet`] - the change categories a watcher
//!   subscribes to
//! - [`Config`] and [`WatchConfig`] - file-backed configuration
//! - [`ConfigError`] - configuration and validation errors

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod kind;

pub use config::{Config, WatchConfig};
pub use error::ConfigError;
pub use kind::{ChangeKind, EventKindSet};
