//! Error types for the dw-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while constructing a watcher, registering directories, and dispatching
//! events.

use camino::Utf8PathBuf;
use dw_core::ConfigError;

use crate::registry::WatchHandle;

/// Errors that can occur during directory watching.
///
/// # Error Recovery Strategy
///
/// - **Configuration** ([`WatchError::Configuration`]): Fatal - no watcher is created
/// - **Service init** ([`WatchError::ServiceInit`]): Fatal - no watcher is created
/// - **Registration** ([`WatchError::Registration`]): Recoverable - log, skip the directory
/// - **Stale handle** ([`WatchError::StaleHandle`]): Recoverable - drop the registry entry
/// - **Shutdown** ([`WatchError::Shutdown`]): Recoverable - log, the loop still ends
/// - **Closed** ([`WatchError::Closed`]): Recoverable - registration after close is ignored
/// - **Walk** ([`WatchError::Walk`]): Recoverable - skip the entry, keep traversing
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip the event
///
/// Only the fatal variants are ever returned to the caller; everything else
/// is logged by the watcher.
///
/// # Examples
///
/// ```
/// use dw_watcher::WatchError;
///
/// fn handle_watch_error(err: &WatchError) {
///     if err.is_fatal() {
///         eprintln!("Cannot start watcher: {err}");
///     } else {
///         eprintln!("Warning: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The watcher was configured with invalid parameters.
    #[error("invalid watcher configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// The native watch service could not be allocated.
    #[error("failed to start watch service: {0}")]
    ServiceInit(String),

    /// A directory could not be registered for notifications.
    #[error("failed to watch directory {path}: {source}")]
    Registration {
        /// The directory that could not be registered.
        path: Utf8PathBuf,
        /// The underlying watch service error.
        #[source]
        source: notify::Error,
    },

    /// A previously valid watch handle is no longer valid.
    #[error("watch handle {handle} for {path} is no longer valid")]
    StaleHandle {
        /// The invalidated handle.
        handle: WatchHandle,
        /// The directory the handle represented.
        path: Utf8PathBuf,
    },

    /// Shutting down the watch service failed.
    #[error("failed to shut down watch service: {0}")]
    Shutdown(String),

    /// The watcher has already been closed.
    #[error("watcher is closed")]
    Closed,

    /// A directory tree could not be fully traversed.
    #[error("failed to walk directory tree: {0}")]
    Walk(#[from] ignore::Error),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl WatchError {
    /// Creates a new [`WatchError::ServiceInit`] error.
    #[inline]
    pub fn service_init(reason: impl ToString) -> Self {
        Self::ServiceInit(reason.to_string())
    }

    /// Creates a new [`WatchError::Registration`] error.
    #[inline]
    pub fn registration(path: impl Into<Utf8PathBuf>, source: notify::Error) -> Self {
        Self::Registration {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`WatchError::StaleHandle`] error.
    #[inline]
    pub fn stale_handle(handle: WatchHandle, path: impl Into<Utf8PathBuf>) -> Self {
        Self::StaleHandle {
            handle,
            path: path.into(),
        }
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error prevents a watcher from being created.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ServiceInit(_))
    }

    /// Returns `true` if watching can continue after this error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Returns the directory associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Registration { path, .. } | Self::StaleHandle { path, .. } => Some(path),
            Self::Configuration(_)
            | Self::ServiceInit(_)
            | Self::Shutdown(_)
            | Self::Closed
            | Self::Walk(_)
            | Self::NonUtf8Path(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_configuration_is_fatal() {
        let err = WatchError::from(ConfigError::EmptyEventKinds);
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
        assert!(err.path().is_none());
        insta::assert_snapshot!(
            err.to_string(),
            @"invalid watcher configuration: at least one event kind must be selected (create, modify, delete)"
        );
    }

    #[test]
    fn test_service_init_is_fatal() {
        let err = WatchError::service_init("inotify limit reached");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("inotify limit reached"));
    }

    #[test]
    fn test_registration_is_recoverable() {
        let source = notify::Error::io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = WatchError::registration("/srv/dic/missing", source);
        assert!(err.is_recoverable());
        assert_eq!(err.path().map(|p| p.as_str()), Some("/srv/dic/missing"));
        assert!(err.to_string().contains("/srv/dic/missing"));
    }

    #[test]
    fn test_stale_handle_display() {
        let err = WatchError::stale_handle(WatchHandle::new(7), "/srv/dic/old");
        assert!(err.is_recoverable());
        insta::assert_snapshot!(
            err.to_string(),
            @"watch handle #7 for /srv/dic/old is no longer valid"
        );
    }

    #[test]
    fn test_closed_and_shutdown_are_recoverable() {
        assert!(WatchError::Closed.is_recoverable());
        assert!(WatchError::Shutdown("join failed".to_owned()).is_recoverable());
    }

    #[test]
    fn test_non_utf8_path() {
        let err = WatchError::non_utf8_path(PathBuf::from("test"));
        assert!(err.is_recoverable());
        assert!(err.path().is_none());
        assert!(err.to_string().contains("not valid UTF-8"));
    }
}
