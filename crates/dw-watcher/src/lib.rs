//! Recursive directory watching with self-extending registration.
//!
//! This crate watches directories through the native watch service exposed
//! by `notify`, one non-recursive subscription per directory, and keeps the
//! set of subscriptions in step with the tree: directories created under a
//! watched directory are registered as they appear, and directories that
//! disappear are dropped.
//!
//! # Overview
//!
//! - [`WatchRegistry`] - flat bidirectional map between [`WatchHandle`]s and
//!   the directories they represent
//! - [`DirectoryWatcher`] - owns the registry and the native service, runs
//!   the dispatch loop, delivers changes to a [`WatcherCallback`]
//! - [`DirectoryWalker`] - pre-order directory traversal used for tree
//!   registration
//!
//! # Architecture
//!
//! ```text
//! caller ── watch_directory / watch_directory_tree ──► WatchRegistry ──► notify
//!                                                          ▲               │
//!                                                          │ new dirs      │ raw events
//!                                                          │               ▼
//! WatcherCallback ◄── (kind, absolute path) ◄──────── dispatch loop (tokio)
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! dw-cli ──► dw-watcher ──► dw-core
//! ```
//!
//! # Usage
//!
//! ## Watching a tree with a closure
//!
//! ```no_run
//! use camino::Utf8Path;
//! use dw_core::ChangeKind;
//! use dw_watcher::DirectoryWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = DirectoryWatcher::create(
//!         |kind: ChangeKind, path: &Utf8Path| println!("{kind}: {path}"),
//!         ChangeKind::ALL,
//!     )?;
//!
//!     let watched = watcher.watch_directory_tree("/srv/dic");
//!     println!("watching {watched} directories");
//!
//!     tokio::signal::ctrl_c().await?;
//!     watcher.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Consuming events with `tokio::select!`
//!
//! ```no_run
//! use dw_core::ChangeKind;
//! use dw_watcher::{ChannelCallback, DirectoryWatcher};
//!
//! # async fn example() -> Result<(), dw_watcher::WatchError> {
//! let (callback, mut events) = ChannelCallback::new();
//! let watcher = DirectoryWatcher::create(callback, [ChangeKind::Create])?;
//! watcher.watch_directory("./incoming");
//!
//! loop {
//!     tokio::select! {
//!         Some(event) = events.recv() => println!("{event}"),
//!         _ = tokio::signal::ctrl_c() => break,
//!     }
//! }
//!
//! watcher.shutdown().await
//! # }
//! ```
//!
//! # Error Handling
//!
//! Only construction can fail from the caller's point of view. Registration
//! and dispatch errors are logged through `tracing` and the watcher keeps
//! serving the directories that are unaffected:
//!
//! ```
//! use dw_watcher::WatchError;
//!
//! fn report(err: &WatchError) {
//!     if err.is_fatal() {
//!         eprintln!("Cannot start watcher: {err}");
//!     } else {
//!         eprintln!("Warning: {err}");
//!     }
//! }
//! ```
//!
//! # Known Behaviour
//!
//! - Deleting a watched subdirectory, or changing its metadata, is reported
//!   by both its own subscription and its parent's; the second report is
//!   dropped.
//! - Deleting or moving a watched directory stops watching every directory
//!   registered below it. A tree moved within the watched area is registered
//!   again under its new name.
//! - Paths are made absolute but symbolic links are not resolved, so events
//!   are reported under the path the caller gave.
//! - Entries created inside a new directory before its subscription is in
//!   place are registered (if directories) but not reported.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod backend;
pub mod callback;
pub mod error;
pub mod events;
pub mod registry;
pub mod walker;
pub mod watcher;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{ChangeEvent, RawEvent};

// Re-export callback types
pub use callback::{ChannelCallback, WatcherCallback};

// Re-export registry types
pub use registry::{WatchHandle, WatchRegistry, WatchedDirectory};

// Re-export backend seam
pub use backend::{WatchBackend, native_backend};

// Re-export watcher types
pub use walker::DirectoryWalker;
pub use watcher::DirectoryWatcher;
