//! Bookkeeping for per-directory watch subscriptions.
//!
//! The native watch service only ever watches single directories. A recursive
//! watch is a set of independent entries in the [`WatchRegistry`], one per
//! directory, each identified by a [`WatchHandle`].
//!
//! The registry is a flat bidirectional map (handle to path and path to
//! handle). There is no parent/child structure: a directory and its
//! subdirectories are unrelated entries, mirroring how the OS registers them.
//!
//! # Concurrency
//!
//! Registration calls run on the caller's thread while the dispatch loop
//! reads (and occasionally mutates) the registry from the blocking pool. The
//! maps sit behind a [`parking_lot::RwLock`]; [`WatchRegistry::register`]
//! additionally requires `&mut` access to the backend, which the watcher
//! serialises behind its own mutex.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::backend::WatchBackend;
use crate::error::WatchError;

/// Opaque identifier for a single-directory watch subscription.
///
/// Handles are issued by [`WatchRegistry::register`] and are never reused
/// within one registry, so a stale handle can never alias a newer entry.
///
/// # Examples
///
/// ```
/// use dw_watcher::WatchHandle;
///
/// let handle = WatchHandle::new(3);
/// assert_eq!(handle.as_u64(), 3);
/// assert_eq!(handle.to_string(), "#3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

impl WatchHandle {
    /// Creates a handle from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered directory: its handle and absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedDirectory {
    /// The subscription handle.
    pub handle: WatchHandle,
    /// The absolute directory path.
    pub path: Utf8PathBuf,
}

#[derive(Debug, Default)]
struct RegistryMaps {
    by_handle: FxHashMap<WatchHandle, Utf8PathBuf>,
    by_path: FxHashMap<Utf8PathBuf, WatchHandle>,
    next_handle: u64,
}

/// Maps watch handles to the directories they represent.
///
/// # Examples
///
/// ```
/// use dw_watcher::{WatchHandle, WatchRegistry};
///
/// let registry = WatchRegistry::new();
/// assert!(registry.is_empty());
/// assert!(registry.resolve(WatchHandle::new(0)).is_none());
/// ```
#[derive(Debug, Default)]
pub struct WatchRegistry {
    maps: RwLock<RegistryMaps>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `path` with the backend and records the new entry.
    ///
    /// `path` is expected to be absolute. If the path is already registered
    /// its existing handle is returned and the backend is not called again.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Registration`] if the backend refuses the
    /// directory. Nothing is recorded in that case.
    pub fn register(
        &self,
        backend: &mut dyn WatchBackend,
        path: &Utf8Path,
    ) -> Result<WatchHandle, WatchError> {
        if let Some(handle) = self.handle_for(path) {
            debug!(path = %path, handle = %handle, "Directory already watched");
            return Ok(handle);
        }

        backend
            .watch(path)
            .map_err(|source| WatchError::registration(path, source))?;

        let mut maps = self.maps.write();
        let handle = WatchHandle(maps.next_handle);
        maps.next_handle += 1;
        maps.by_handle.insert(handle, path.to_owned());
        maps.by_path.insert(path.to_owned(), handle);
        drop(maps);

        info!(path = %path, handle = %handle, "Watching directory");
        Ok(handle)
    }

    /// Returns the directory a handle represents.
    #[must_use]
    pub fn resolve(&self, handle: WatchHandle) -> Option<Utf8PathBuf> {
        self.maps.read().by_handle.get(&handle).cloned()
    }

    /// Returns the handle registered for `path`, if any.
    #[must_use]
    pub fn handle_for(&self, path: &Utf8Path) -> Option<WatchHandle> {
        self.maps.read().by_path.get(path).copied()
    }

    /// Returns the registered directory at `path`, if any.
    #[must_use]
    pub fn lookup(&self, path: &Utf8Path) -> Option<WatchedDirectory> {
        let maps = self.maps.read();
        let (path, handle) = maps.by_path.get_key_value(path)?;
        Some(WatchedDirectory {
            handle: *handle,
            path: path.clone(),
        })
    }

    /// Removes a handle's entry, returning the path it represented.
    ///
    /// Removing an unknown handle is a no-op.
    pub fn unregister(&self, handle: WatchHandle) -> Option<Utf8PathBuf> {
        let mut maps = self.maps.write();
        let path = maps.by_handle.remove(&handle)?;
        maps.by_path.remove(&path);
        Some(path)
    }

    /// Removes `root` and every entry below it, returning the removed
    /// entries sorted by path.
    ///
    /// A deleted or moved directory takes its whole registered subtree with
    /// it; the descendants' paths no longer name what their handles watch.
    pub fn unregister_tree(&self, root: &Utf8Path) -> Vec<WatchedDirectory> {
        let mut maps = self.maps.write();
        let handles: Vec<WatchHandle> = maps
            .by_path
            .iter()
            .filter(|(path, _)| path.starts_with(root))
            .map(|(_, handle)| *handle)
            .collect();

        let mut removed = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(path) = maps.by_handle.remove(&handle) {
                maps.by_path.remove(&path);
                removed.push(WatchedDirectory { handle, path });
            }
        }
        drop(maps);

        removed.sort_by(|a, b| a.path.cmp(&b.path));
        removed
    }

    /// Removes every entry, returning the directories that were registered.
    pub fn clear(&self) -> Vec<Utf8PathBuf> {
        let mut maps = self.maps.write();
        maps.by_path.clear();
        maps.by_handle.drain().map(|(_, path)| path).collect()
    }

    /// Returns the number of registered directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.read().by_handle.len()
    }

    /// Returns `true` if no directories are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.read().by_handle.is_empty()
    }

    /// Returns a snapshot of all entries, sorted by path.
    #[must_use]
    pub fn directories(&self) -> Vec<WatchedDirectory> {
        let maps = self.maps.read();
        let mut dirs: Vec<WatchedDirectory> = maps
            .by_handle
            .iter()
            .map(|(handle, path)| WatchedDirectory {
                handle: *handle,
                path: path.clone(),
            })
            .collect();
        drop(maps);
        dirs.sort_by(|a, b| a.path.cmp(&b.path));
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::RecordingBackend;

    #[test]
    fn test_register_and_resolve() {
        let registry = WatchRegistry::new();
        let mut backend = RecordingBackend::default();

        let handle = registry
            .register(&mut backend, Utf8Path::new("/srv/dic"))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(handle), Some(Utf8PathBuf::from("/srv/dic")));
        assert_eq!(registry.handle_for(Utf8Path::new("/srv/dic")), Some(handle));
        assert_eq!(backend.watched(), vec![Utf8PathBuf::from("/srv/dic")]);
    }

    #[test]
    fn test_register_same_path_returns_existing_handle() {
        let registry = WatchRegistry::new();
        let mut backend = RecordingBackend::default();

        let first = registry
            .register(&mut backend, Utf8Path::new("/srv/dic"))
            .unwrap();
        let second = registry
            .register(&mut backend, Utf8Path::new("/srv/dic"))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(backend.watched().len(), 1);
    }

    #[test]
    fn test_register_failure_records_nothing() {
        let registry = WatchRegistry::new();
        let mut backend = RecordingBackend::failing_on("/srv/locked");

        let result = registry.register(&mut backend, Utf8Path::new("/srv/locked"));

        assert!(matches!(result, Err(WatchError::Registration { .. })));
        assert!(registry.is_empty());
        assert!(registry.handle_for(Utf8Path::new("/srv/locked")).is_none());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = WatchRegistry::new();
        let mut backend = RecordingBackend::default();
        let handle = registry
            .register(&mut backend, Utf8Path::new("/srv/dic"))
            .unwrap();

        assert_eq!(registry.unregister(handle), Some(Utf8PathBuf::from("/srv/dic")));
        assert_eq!(registry.unregister(handle), None);
        assert!(registry.resolve(handle).is_none());
        assert!(registry.handle_for(Utf8Path::new("/srv/dic")).is_none());
    }

    #[test]
    fn test_reregister_issues_new_handle() {
        let registry = WatchRegistry::new();
        let mut backend = RecordingBackend::default();
        let path = Utf8Path::new("/srv/dic");

        let old = registry.register(&mut backend, path).unwrap();
        registry.unregister(old);
        let new = registry.register(&mut backend, path).unwrap();

        assert_ne!(old, new);
        assert!(registry.resolve(old).is_none());
        assert_eq!(registry.resolve(new), Some(path.to_owned()));
    }

    #[test]
    fn test_lookup_and_directories() {
        let registry = WatchRegistry::new();
        let mut backend = RecordingBackend::default();
        let b = registry
            .register(&mut backend, Utf8Path::new("/srv/b"))
            .unwrap();
        let a = registry
            .register(&mut backend, Utf8Path::new("/srv/a"))
            .unwrap();

        let found = registry.lookup(Utf8Path::new("/srv/b")).unwrap();
        assert_eq!(found.handle, b);

        let dirs = registry.directories();
        assert_eq!(
            dirs.iter().map(|d| d.handle).collect::<Vec<_>>(),
            vec![a, b]
        );
    }

    #[test]
    fn test_unregister_tree_removes_descendants_only() {
        let registry = WatchRegistry::new();
        let mut backend = RecordingBackend::default();
        for path in ["/srv/a", "/srv/a/x", "/srv/a/x/y", "/srv/ab", "/srv/b"] {
            registry.register(&mut backend, Utf8Path::new(path)).unwrap();
        }

        let removed: Vec<Utf8PathBuf> = registry
            .unregister_tree(Utf8Path::new("/srv/a"))
            .into_iter()
            .map(|d| d.path)
            .collect();

        assert_eq!(
            removed,
            vec![
                Utf8PathBuf::from("/srv/a"),
                Utf8PathBuf::from("/srv/a/x"),
                Utf8PathBuf::from("/srv/a/x/y"),
            ]
        );
        let remaining: Vec<Utf8PathBuf> = registry.directories().into_iter().map(|d| d.path).collect();
        assert_eq!(
            remaining,
            vec![Utf8PathBuf::from("/srv/ab"), Utf8PathBuf::from("/srv/b")]
        );

        // Re-registering a removed descendant subscribes it again.
        registry.register(&mut backend, Utf8Path::new("/srv/a/x")).unwrap();
        assert_eq!(
            backend
                .watched()
                .iter()
                .filter(|p| p.as_str() == "/srv/a/x")
                .count(),
            2
        );
    }

    #[test]
    fn test_clear() {
        let registry = WatchRegistry::new();
        let mut backend = RecordingBackend::default();
        registry
            .register(&mut backend, Utf8Path::new("/srv/a"))
            .unwrap();
        registry
            .register(&mut backend, Utf8Path::new("/srv/b"))
            .unwrap();

        let mut cleared = registry.clear();
        cleared.sort();
        assert_eq!(
            cleared,
            vec![Utf8PathBuf::from("/srv/a"), Utf8PathBuf::from("/srv/b")]
        );
        assert!(registry.is_empty());
    }
}
