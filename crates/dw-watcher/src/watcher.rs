//! Recursive directory watcher with a cancellable dispatch loop.
//!
//! This module provides the [`DirectoryWatcher`] type: it owns the native
//! watch service, the [`WatchRegistry`] of subscribed directories and one
//! background dispatch task that turns raw notifications into
//! [`WatcherCallback`] invocations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ notify RecommendedWatcher│  (one subscription per directory)
//! └────────────┬─────────────┘
//!              │ unbounded mpsc
//!              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Dispatch task (tokio::spawn)                                 │
//! │   select! { token.cancelled() => exit, rx.recv() => batch }  │
//! └────────────┬─────────────────────────────────────────────────┘
//!              │ spawn_blocking (one batch at a time)
//!              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ process_batch                                                │
//! │   RawEvent ─► owning directory ─► absolute path              │
//! │   new directory? ─► register subtree                         │
//! │   subscribed kind? ─► WatcherCallback::on_change             │
//! │   re-arm touched handles (drop stale entries)                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use camino::Utf8Path;
//! use dw_core::ChangeKind;
//! use dw_watcher::{ChannelCallback, DirectoryWatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (callback, mut events) = ChannelCallback::new();
//!     let watcher = DirectoryWatcher::create(callback, ChangeKind::ALL)?;
//!
//!     watcher.watch_directory_tree("/srv/dic");
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event}");
//!     }
//!
//!     watcher.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use dw_core::{ChangeKind, EventKindSet};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{NativeEvent, NativeEventReceiver, WatchBackend, native_backend};
use crate::callback::WatcherCallback;
use crate::error::WatchError;
use crate::events::RawEvent;
use crate::registry::{WatchHandle, WatchRegistry, WatchedDirectory};
use crate::walker::DirectoryWalker;

/// Handles touched by one batch; re-armed once the batch is delivered.
type TouchedHandles = SmallVec<[WatchHandle; 8]>;

/// Watches directories, and optionally whole trees, for changes.
///
/// # Lifecycle
///
/// 1. **Creation**: [`DirectoryWatcher::create`] validates the event kinds,
///    allocates the native service and spawns the dispatch task. Nothing is
///    watched yet.
///
/// 2. **Registration**: [`watch_directory`](Self::watch_directory) and
///    [`watch_directory_tree`](Self::watch_directory_tree) subscribe
///    directories. Failures are logged, never returned.
///
/// 3. **Dispatch**: the background task delivers every subscribed change to
///    the callback and keeps the registry in step with the tree: new
///    directories are registered as they appear, deleted ones are dropped.
///
/// 4. **Shutdown**: [`close`](Self::close) stops the task and releases the
///    native service. [`shutdown`](Self::shutdown) additionally waits for the
///    task to exit. Dropping the watcher closes it.
///
/// # Thread Safety
///
/// Registration runs on the caller's thread and may race with the dispatch
/// task; both go through the same lock-protected registry and native handle.
pub struct DirectoryWatcher {
    /// State shared with the dispatch task.
    shared: Arc<Shared>,

    /// Cancels the dispatch task's wait for events.
    token: CancellationToken,

    /// Handle to the dispatch task, taken by [`shutdown`](Self::shutdown).
    task_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("kinds", &self.shared.kinds)
            .field("watched", &self.shared.registry.len())
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DirectoryWatcher {
    /// Creates a watcher delivering the given kinds of change to `callback`.
    ///
    /// Must be called from within a tokio runtime: the dispatch task is
    /// spawned onto it and batch processing uses its blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Configuration`] if `kinds` is empty, and
    /// [`WatchError::ServiceInit`] if there is no runtime or the native
    /// watch service cannot be allocated. No task is started in either case.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use dw_core::ChangeKind;
    /// use dw_watcher::DirectoryWatcher;
    ///
    /// # async fn example() -> Result<(), dw_watcher::WatchError> {
    /// let watcher = DirectoryWatcher::create(
    ///     |kind: ChangeKind, path: &Utf8Path| println!("{kind} {path}"),
    ///     [ChangeKind::Create, ChangeKind::Delete],
    /// )?;
    /// watcher.watch_directory("./incoming");
    /// # Ok(())
    /// # }
    /// ```
    pub fn create<C: WatcherCallback>(
        callback: C,
        kinds: impl IntoIterator<Item = ChangeKind>,
    ) -> Result<Self, WatchError> {
        let kinds = EventKindSet::new(kinds)?;
        for kind in kinds.iter() {
            info!(kind = %kind, "Registering event kind");
        }

        let runtime = Handle::try_current().map_err(WatchError::service_init)?;
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        let backend = native_backend(events_tx)?;

        Ok(Self::with_backend(
            &runtime,
            Box::new(backend),
            events_rx,
            Box::new(callback),
            kinds,
        ))
    }

    /// Creates a watcher over an arbitrary backend and event source.
    pub(crate) fn with_backend(
        runtime: &Handle,
        backend: Box<dyn WatchBackend>,
        events: NativeEventReceiver,
        callback: Box<dyn WatcherCallback>,
        kinds: EventKindSet,
    ) -> Self {
        let shared = Arc::new(Shared {
            registry: WatchRegistry::new(),
            backend: Mutex::new(Some(backend)),
            echoes: Mutex::new(Echoes::default()),
            kinds,
            callback,
        });
        let token = CancellationToken::new();

        let task_handle = runtime.spawn(run_dispatch_loop(
            Arc::clone(&shared),
            events,
            token.clone(),
        ));

        Self {
            shared,
            token,
            task_handle: Some(task_handle),
        }
    }

    /// Watches exactly `path`, without its subdirectories.
    ///
    /// Relative paths are resolved against the current directory; symbolic
    /// links are kept, so events are reported under the path as given.
    /// Returns the handle of the subscription, or `None` if the directory
    /// could not be registered (the reason is logged).
    pub fn watch_directory(&self, path: impl AsRef<Path>) -> Option<WatchHandle> {
        let result = absolute_path(path.as_ref()).and_then(|dir| self.shared.register(&dir));
        match result {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(error = %err, "Failed to watch directory");
                None
            }
        }
    }

    /// Watches `path` and every directory below it.
    ///
    /// The tree is traversed in pre-order without following symbolic links
    /// below `path`.
    /// A directory that cannot be read or registered is logged and skipped;
    /// traversal continues with its siblings. Directories created later are
    /// picked up by the dispatch loop.
    ///
    /// Returns the number of directories registered.
    pub fn watch_directory_tree(&self, path: impl AsRef<Path>) -> usize {
        match absolute_path(path.as_ref()) {
            Ok(root) => self.shared.register_tree(&root),
            Err(err) => {
                error!(error = %err, "Failed to watch directory tree");
                0
            }
        }
    }

    /// Returns the number of directories currently watched.
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Returns `true` if exactly `path` is watched.
    #[must_use]
    pub fn is_watching(&self, path: &Utf8Path) -> bool {
        self.shared.registry.handle_for(path).is_some()
    }

    /// Returns a snapshot of the watched directories, sorted by path.
    #[must_use]
    pub fn watched_directories(&self) -> Vec<WatchedDirectory> {
        self.shared.registry.directories()
    }

    /// Returns the change kinds delivered to the callback.
    #[must_use]
    pub fn event_kinds(&self) -> &EventKindSet {
        &self.shared.kinds
    }

    /// Returns `true` until the watcher is closed or its task has ended.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the dispatch loop and releases the native watch service.
    ///
    /// Returns without waiting for the loop; a callback already running
    /// finishes, no further callbacks start. Calling `close` again is a
    /// no-op, and later registrations are rejected.
    pub fn close(&self) {
        if self.token.is_cancelled() {
            debug!("Directory watcher already closed");
            return;
        }

        info!("Closing directory watcher");
        self.token.cancel();
        self.shared.release();
    }

    /// Closes the watcher and waits for the dispatch loop to exit.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Shutdown`] if the dispatch task panicked or was
    /// aborted.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        self.close();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| WatchError::Shutdown(e.to_string()))?;
        }

        Ok(())
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// State shared between the watcher handle and its dispatch task.
struct Shared {
    registry: WatchRegistry,

    /// The native service; `None` once the watcher is closed.
    backend: Mutex<Option<Box<dyn WatchBackend>>>,

    echoes: Mutex<Echoes>,

    kinds: EventKindSet,

    callback: Box<dyn WatcherCallback>,
}

impl Shared {
    /// Subscribes one directory.
    fn register(&self, dir: &Utf8Path) -> Result<WatchHandle, WatchError> {
        let mut backend = self.backend.lock();
        let Some(backend) = backend.as_mut() else {
            return Err(WatchError::Closed);
        };
        self.registry.register(&mut **backend, dir)
    }

    /// Subscribes `root` and all of its descendant directories.
    fn register_tree(&self, root: &Utf8Path) -> usize {
        let mut registered = 0;

        for dir in DirectoryWalker::new(root).directories() {
            match dir.and_then(|dir| self.register(&dir)) {
                Ok(_) => registered += 1,
                Err(WatchError::Closed) => {
                    warn!(root = %root, "Watcher closed during tree registration");
                    break;
                }
                Err(err @ WatchError::Walk(_)) => {
                    warn!(error = %err, "Skipping unreadable entry");
                }
                Err(err) => {
                    error!(error = %err, "Failed to watch directory");
                }
            }
        }

        debug!(root = %root, registered, "Directory tree registered");
        registered
    }

    /// Drops `root` and every watched directory below it, registry entries
    /// and native subscriptions alike.
    fn forget_tree(&self, root: &Utf8Path) {
        let removed = self.registry.unregister_tree(root);
        if removed.is_empty() {
            return;
        }

        let mut backend = self.backend.lock();
        for dir in removed {
            info!(
                error = %WatchError::stale_handle(dir.handle, &dir.path),
                "Stopped watching directory"
            );
            if let Some(backend) = backend.as_mut() {
                // The OS usually drops the subscription itself when the
                // directory goes away.
                if let Err(e) = backend.unwatch(&dir.path) {
                    trace!(path = %dir.path, error = %e, "Native subscription already gone");
                }
            }
        }
    }

    /// Releases the native service and forgets every directory.
    fn release(&self) {
        let Some(backend) = self.backend.lock().take() else {
            return;
        };

        let released = self.registry.clear().len();
        drop(backend);
        info!(directories = released, "Released native watch service");
    }

    /// Delivers one batch of native events.
    ///
    /// Stops early, between two callbacks, once the watcher is closed.
    fn process_batch(&self, batch: Vec<NativeEvent>, token: &CancellationToken) {
        let mut touched = TouchedHandles::new();
        let mut rescan = false;
        self.echoes.lock().rotate();

        for event in batch {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, paths = ?e.paths, "Watch service error");
                    continue;
                }
            };

            for raw in RawEvent::from_native(&event) {
                if token.is_cancelled() {
                    debug!("Watcher closed, discarding rest of batch");
                    return;
                }
                match raw {
                    RawEvent::Overflow => {
                        warn!(kind = ?event.kind, "Event overflow, changes may have been lost");
                        rescan = true;
                    }
                    RawEvent::Change { kind, path } => match Utf8PathBuf::from_path_buf(path) {
                        Ok(path) => self.dispatch(kind, &path, &mut touched),
                        Err(path) => {
                            warn!(error = %WatchError::non_utf8_path(path), "Skipping event");
                        }
                    },
                }
            }
        }

        if rescan {
            touched = self.registry.directories().into_iter().map(|d| d.handle).collect();
        }
        self.rearm(&touched);
    }

    /// Resolves a single change and hands it to the callback.
    fn dispatch(&self, kind: ChangeKind, path: &Utf8Path, touched: &mut TouchedHandles) {
        let watched = self.registry.handle_for(path);
        if self.is_echo(kind, path, watched.is_some()) {
            trace!(kind = %kind, path = %path, "Second report of a watched directory, skipping");
            return;
        }

        // Registry bookkeeping happens whether or not the kind is subscribed.
        if let Some(handle) = watched {
            if kind == ChangeKind::Delete {
                self.forget_tree(path);
            } else {
                touch(touched, handle);
            }
        }

        if !self.kinds.contains(kind) {
            trace!(kind = %kind, path = %path, "Kind not subscribed, skipping");
            return;
        }

        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            debug!(path = %path, "Event has no owning directory, skipping");
            return;
        };
        let Some(owner) = self.registry.lookup(parent) else {
            debug!(path = %path, "Owning directory no longer watched, skipping");
            return;
        };
        touch(touched, owner.handle);

        let absolute = owner.path.join(name);
        debug!(
            kind = %kind,
            handle = %owner.handle,
            dir = %owner.path,
            entry = name,
            path = %absolute,
            "Resolved event"
        );

        if kind == ChangeKind::Create {
            self.register_if_directory(&absolute);
        }

        self.callback.on_change(kind, &absolute);
    }

    /// Returns `true` for the second report of a change to a watched
    /// directory.
    ///
    /// A watched directory whose parent is also watched has its deletion and
    /// metadata changes reported twice: once by its own subscription and once
    /// by the parent's. The first report is delivered and the second, arriving
    /// in the same batch or the next, is swallowed.
    fn is_echo(&self, kind: ChangeKind, path: &Utf8Path, watched: bool) -> bool {
        let mut echoes = self.echoes.lock();
        if kind == ChangeKind::Create {
            echoes.discard(path);
            return false;
        }
        if echoes.take(kind, path) {
            return true;
        }

        let parent_watched = path
            .parent()
            .is_some_and(|parent| self.registry.handle_for(parent).is_some());
        if watched && parent_watched {
            echoes.expect(kind, path);
        }
        false
    }

    /// Registers a newly created entry's subtree when it is a directory.
    fn register_if_directory(&self, path: &Utf8Path) {
        match path.symlink_metadata() {
            Ok(meta) if meta.is_dir() => {
                info!(path = %path, "New directory, watching its tree");
                self.register_tree(path);
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(path = %path, "Created entry vanished before it could be inspected");
            }
            Err(e) => {
                let err = WatchError::registration(path, notify::Error::io(e));
                error!(error = %err, "Cannot inspect created entry");
            }
        }
    }

    /// Drops every touched handle whose directory no longer exists, along
    /// with the directories registered below it.
    fn rearm(&self, touched: &[WatchHandle]) {
        for &handle in touched {
            let Some(path) = self.registry.resolve(handle) else {
                continue;
            };
            // Follows links: a root watched through a symlink stays armed.
            if !path.is_dir() {
                self.forget_tree(&path);
            }
        }
    }
}

/// Changes to watched directories already delivered once and expected to be
/// reported again by a second subscription.
///
/// Entries live for the batch that recorded them and the one after it.
#[derive(Debug, Default)]
struct Echoes {
    current: FxHashSet<(ChangeKind, Utf8PathBuf)>,
    previous: FxHashSet<(ChangeKind, Utf8PathBuf)>,
}

impl Echoes {
    /// Starts a new batch, expiring entries recorded two batches ago.
    fn rotate(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }

    fn expect(&mut self, kind: ChangeKind, path: &Utf8Path) {
        self.current.insert((kind, path.to_owned()));
    }

    /// Consumes a pending entry, returning `true` if there was one.
    fn take(&mut self, kind: ChangeKind, path: &Utf8Path) -> bool {
        let key = (kind, path.to_owned());
        self.current.remove(&key) || self.previous.remove(&key)
    }

    /// Drops pending entries for a path that was created again.
    fn discard(&mut self, path: &Utf8Path) {
        self.current.retain(|(_, p)| p != path);
        self.previous.retain(|(_, p)| p != path);
    }
}

/// Waits for native events and processes them batch by batch until
/// cancelled.
async fn run_dispatch_loop(
    shared: Arc<Shared>,
    mut events: NativeEventReceiver,
    token: CancellationToken,
) {
    info!(kinds = %shared.kinds, "Dispatch loop started");

    loop {
        let first = tokio::select! {
            biased;

            () = token.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Native event channel closed");
                    break;
                };
                event
            }
        };

        let mut batch = vec![first];
        while let Ok(event) = events.try_recv() {
            batch.push(event);
        }
        trace!(events = batch.len(), "Processing event batch");

        let worker = Arc::clone(&shared);
        let worker_token = token.clone();
        let result =
            tokio::task::spawn_blocking(move || worker.process_batch(batch, &worker_token)).await;
        if let Err(e) = result {
            error!(error = %e, "Event batch processing failed");
        }
    }

    shared.release();
    info!("Dispatch loop stopped");
}

/// Makes `path` absolute and UTF-8 without resolving symbolic links.
fn absolute_path(path: &Path) -> Result<Utf8PathBuf, WatchError> {
    let absolute = std::path::absolute(path).map_err(|e| {
        WatchError::registration(path.to_string_lossy().into_owned(), notify::Error::io(e))
    })?;
    Utf8PathBuf::from_path_buf(absolute).map_err(WatchError::non_utf8_path)
}

fn touch(touched: &mut TouchedHandles, handle: WatchHandle) {
    if !touched.contains(&handle) {
        touched.push(handle);
    }
}
