//! The native watch service seam.
//!
//! [`WatchBackend`] is the minimal surface the registry needs from the OS:
//! subscribe to one directory (non-recursively) and cancel that
//! subscription. The production backend is `notify`'s
//! [`RecommendedWatcher`], whose raw events are forwarded into a tokio
//! channel drained by the dispatch loop.

use camino::Utf8Path;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::WatchError;

/// A raw notification as delivered by the native service.
pub type NativeEvent = notify::Result<notify::Event>;

/// Sending half of the channel between the native service and the dispatch loop.
pub type NativeEventSender = mpsc::UnboundedSender<NativeEvent>;

/// Receiving half of the channel between the native service and the dispatch loop.
pub type NativeEventReceiver = mpsc::UnboundedReceiver<NativeEvent>;

/// A service able to watch single directories for changes.
///
/// Implementations must only watch the given directory itself, never its
/// subdirectories; recursion is handled by the watcher.
pub trait WatchBackend: Send + 'static {
    /// Starts delivering events for entries of `dir`.
    fn watch(&mut self, dir: &Utf8Path) -> notify::Result<()>;

    /// Stops delivering events for `dir`.
    fn unwatch(&mut self, dir: &Utf8Path) -> notify::Result<()>;
}

impl WatchBackend for RecommendedWatcher {
    fn watch(&mut self, dir: &Utf8Path) -> notify::Result<()> {
        Watcher::watch(self, dir.as_std_path(), RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, dir: &Utf8Path) -> notify::Result<()> {
        Watcher::unwatch(self, dir.as_std_path())
    }
}

/// Allocates the platform's native watch service.
///
/// Every raw notification is forwarded to `events`. The channel is
/// unbounded: the dispatch loop calls back into the service while
/// registering new directories, so the service thread must never block on
/// a full queue.
///
/// # Errors
///
/// Returns [`WatchError::ServiceInit`] if the OS refuses to create the
/// service (for example when the inotify instance limit is reached).
pub fn native_backend(events: NativeEventSender) -> Result<RecommendedWatcher, WatchError> {
    notify::recommended_watcher(move |event: NativeEvent| {
        if events.send(event).is_err() {
            trace!("Dispatch loop gone, dropping native event");
        }
    })
    .map_err(WatchError::service_init)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use camino::Utf8PathBuf;
    use parking_lot::Mutex;

    use super::*;

    /// A backend that records subscriptions instead of touching the OS.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingBackend {
        watched: Arc<Mutex<Vec<Utf8PathBuf>>>,
        unwatched: Arc<Mutex<Vec<Utf8PathBuf>>>,
        fail_on: Option<Utf8PathBuf>,
    }

    impl RecordingBackend {
        pub(crate) fn failing_on(path: &str) -> Self {
            Self {
                fail_on: Some(Utf8PathBuf::from(path)),
                ..Self::default()
            }
        }

        pub(crate) fn watched(&self) -> Vec<Utf8PathBuf> {
            self.watched.lock().clone()
        }

        pub(crate) fn unwatched(&self) -> Vec<Utf8PathBuf> {
            self.unwatched.lock().clone()
        }
    }

    impl WatchBackend for RecordingBackend {
        fn watch(&mut self, dir: &Utf8Path) -> notify::Result<()> {
            if self.fail_on.as_deref() == Some(dir) {
                return Err(
                    notify::Error::path_not_found().add_path(dir.as_std_path().to_path_buf())
                );
            }
            self.watched.lock().push(dir.to_owned());
            Ok(())
        }

        fn unwatch(&mut self, dir: &Utf8Path) -> notify::Result<()> {
            self.unwatched.lock().push(dir.to_owned());
            Ok(())
        }
    }

    #[test]
    fn test_recording_backend_failure() {
        let mut backend = RecordingBackend::failing_on("/srv/locked");
        assert!(backend.watch(Utf8Path::new("/srv/locked")).is_err());
        assert!(backend.watch(Utf8Path::new("/srv/open")).is_ok());
        assert_eq!(backend.watched(), vec![Utf8PathBuf::from("/srv/open")]);
    }

    #[tokio::test]
    async fn test_native_backend_forwards_events() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut backend = native_backend(tx).unwrap();
        WatchBackend::watch(&mut backend, root).unwrap();

        std::fs::write(root.join("marker.txt"), "x").unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(event.paths.iter().any(|p| p.ends_with("marker.txt")));
    }

    #[test]
    fn test_native_backend_rejects_missing_directory() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut backend = native_backend(tx).unwrap();
        let result = WatchBackend::watch(&mut backend, Utf8Path::new("/nonexistent/dirwatch"));
        assert!(result.is_err());
    }
}
