//! Event types for directory change notifications.
//!
//! # Event Flow
//!
//! ```text
//! notify::Event (native, absolute paths)
//!        │
//!        ▼
//!   RawEvent::from_native  ── Overflow ──► skipped
//!        │
//!        ▼
//!   RawEvent::Change (kind, path)
//!        │  owning directory resolved via the registry
//!        ▼
//!   ChangeEvent (kind, absolute path) ──► WatcherCallback
//! ```

use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use dw_core::ChangeKind;
use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

/// A change delivered to the application.
///
/// # Examples
///
/// ```
/// use dw_core::ChangeKind;
/// use dw_watcher::ChangeEvent;
///
/// let event = ChangeEvent::new(ChangeKind::Create, "/srv/dic/words.txt");
/// assert_eq!(event.to_string(), "create /srv/dic/words.txt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,

    /// Absolute path of the affected entry.
    pub path: Utf8PathBuf,
}

impl ChangeEvent {
    /// Creates a new change event.
    #[inline]
    #[must_use]
    pub fn new(kind: ChangeKind, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

/// A native notification reduced to the categories the watcher understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// The service lost events or reported something that cannot be
    /// attributed to a path.
    Overflow,

    /// A change to a single entry, as reported by the service.
    Change {
        /// The change category.
        kind: ChangeKind,
        /// The entry path, as reported (owning directory plus entry name).
        path: PathBuf,
    },
}

impl RawEvent {
    /// Splits a native event into raw events, one per affected path.
    ///
    /// Access notifications carry no change and produce nothing. Paired
    /// rename notifications are dropped because the service also reports
    /// each side separately.
    ///
    /// # Examples
    ///
    /// ```
    /// use dw_core::ChangeKind;
    /// use dw_watcher::RawEvent;
    /// use notify::event::{CreateKind, EventKind};
    ///
    /// let native = notify::Event::new(EventKind::Create(CreateKind::File))
    ///     .add_path("/srv/dic/words.txt".into());
    ///
    /// let raw = RawEvent::from_native(&native);
    /// assert_eq!(raw.len(), 1);
    /// assert!(matches!(&raw[0], RawEvent::Change { kind: ChangeKind::Create, .. }));
    /// ```
    #[must_use]
    pub fn from_native(event: &notify::Event) -> SmallVec<[Self; 2]> {
        if event.need_rescan() || event.paths.is_empty() {
            return smallvec![Self::Overflow];
        }

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Remove(_) => ChangeKind::Delete,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Create,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Delete,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) | EventKind::Access(_) => {
                return SmallVec::new();
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                return event
                    .paths
                    .iter()
                    .map(|path| Self::Change {
                        kind: rename_side(path),
                        path: path.clone(),
                    })
                    .collect();
            }
            EventKind::Modify(_) => ChangeKind::Modify,
            EventKind::Any | EventKind::Other => return smallvec![Self::Overflow],
        };

        event
            .paths
            .iter()
            .map(|path| Self::Change {
                kind,
                path: path.clone(),
            })
            .collect()
    }
}

/// Classifies an unpaired rename by whether the entry is still there.
fn rename_side(path: &Path) -> ChangeKind {
    if path.symlink_metadata().is_ok() {
        ChangeKind::Create
    } else {
        ChangeKind::Delete
    }
}
