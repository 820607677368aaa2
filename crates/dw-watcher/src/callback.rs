//! Consumers of change events.
//!
//! The watcher hands every resolved change to a [`WatcherCallback`]. Any
//! closure taking `(ChangeKind, &Utf8Path)` is a callback, and
//! [`ChannelCallback`] bridges events into async code through a tokio
//! channel.
//!
//! # Examples
//!
//! ```
//! use camino::Utf8Path;
//! use dw_core::ChangeKind;
//! use dw_watcher::WatcherCallback;
//!
//! let log = |kind: ChangeKind, path: &Utf8Path| {
//!     println!("{kind}: {path}");
//! };
//! log.on_change(ChangeKind::Create, Utf8Path::new("/srv/dic/words.txt"));
//! ```

use camino::Utf8Path;
use dw_core::ChangeKind;
use tokio::sync::mpsc;
use tracing::trace;

use crate::events::ChangeEvent;

/// Receives change events from a watcher.
///
/// Callbacks run on the watcher's background pool, one at a time and in the
/// order the OS reported the changes within a batch. A callback that blocks
/// stalls event processing for its watcher, so long-running work should be
/// handed off (see [`ChannelCallback`]).
pub trait WatcherCallback: Send + Sync + 'static {
    /// Called once per change with the change kind and the absolute path.
    fn on_change(&self, kind: ChangeKind, path: &Utf8Path);
}

impl<F> WatcherCallback for F
where
    F: Fn(ChangeKind, &Utf8Path) + Send + Sync + 'static,
{
    #[inline]
    fn on_change(&self, kind: ChangeKind, path: &Utf8Path) {
        self(kind, path);
    }
}

/// Forwards change events into an unbounded tokio channel.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use dw_core::ChangeKind;
/// use dw_watcher::{ChannelCallback, WatcherCallback};
///
/// let (callback, mut events) = ChannelCallback::new();
/// callback.on_change(ChangeKind::Modify, Utf8Path::new("/srv/dic/words.txt"));
///
/// let event = events.try_recv().unwrap();
/// assert_eq!(event.kind, ChangeKind::Modify);
/// ```
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChannelCallback {
    /// Creates a callback and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl WatcherCallback for ChannelCallback {
    fn on_change(&self, kind: ChangeKind, path: &Utf8Path) {
        if self.tx.send(ChangeEvent::new(kind, path)).is_err() {
            trace!(path = %path, "Event receiver dropped, discarding change");
        }
    }
}
