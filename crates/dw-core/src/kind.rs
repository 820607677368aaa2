//! Change categories reported by the directory watcher.
//!
//! [`ChangeKind`] names a single category, and [`EventKindSet`] is the
//! immutable, non-empty subscription a watcher is constructed with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::ConfigError;

/// The category of a filesystem change.
///
/// # Examples
///
/// ```
/// use dw_core::ChangeKind;
///
/// let kind: ChangeKind = "create".parse().unwrap();
/// assert_eq!(kind, ChangeKind::Create);
/// assert_eq!(kind.as_str(), "create");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// An entry was created in (or moved into) a watched directory.
    Create,

    /// An entry in a watched directory was modified.
    Modify,

    /// An entry was deleted from (or moved out of) a watched directory.
    Delete,
}

impl ChangeKind {
    /// Every change kind, in canonical order.
    pub const ALL: [Self; 3] = [Self::Create, Self::Modify, Self::Delete];

    /// Returns the lowercase name used in configuration and output.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "created" => Ok(Self::Create),
            "modify" | "modified" => Ok(Self::Modify),
            "delete" | "deleted" | "remove" => Ok(Self::Delete),
            _ => Err(ConfigError::UnknownEventKind(s.to_owned())),
        }
    }
}

/// A non-empty set of [`ChangeKind`]s a watcher subscribes to.
///
/// The set is fixed at construction and applied uniformly to every directory
/// registered through a watcher. Duplicates are collapsed and the kinds are
/// kept in canonical order.
///
/// # Examples
///
/// ```
/// use dw_core::{ChangeKind, EventKindSet};
///
/// let kinds = EventKindSet::new([ChangeKind::Delete, ChangeKind::Create]).unwrap();
/// assert!(kinds.contains(ChangeKind::Create));
/// assert!(!kinds.contains(ChangeKind::Modify));
/// assert_eq!(kinds.to_string(), "create,delete");
///
/// assert!(EventKindSet::new([]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKindSet {
    kinds: SmallVec<[ChangeKind; 3]>,
}

impl EventKindSet {
    /// Creates a set from the given kinds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyEventKinds`] if no kinds are given.
    pub fn new(kinds: impl IntoIterator<Item = ChangeKind>) -> Result<Self, ConfigError> {
        let mut kinds: SmallVec<[ChangeKind; 3]> = kinds.into_iter().collect();
        if kinds.is_empty() {
            return Err(ConfigError::EmptyEventKinds);
        }
        kinds.sort_unstable();
        kinds.dedup();
        Ok(Self { kinds })
    }

    /// Returns a set containing create, modify, and delete.
    #[must_use]
    pub fn all() -> Self {
        Self {
            kinds: SmallVec::from_slice(&ChangeKind::ALL),
        }
    }

    /// Returns `true` if `kind` is part of the subscription.
    #[inline]
    #[must_use]
    pub fn contains(&self, kind: ChangeKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Returns an iterator over the subscribed kinds.
    pub fn iter(&self) -> impl Iterator<Item = ChangeKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Returns the number of subscribed kinds (always at least one).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns `true` if the set holds no kinds.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for EventKindSet {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for EventKindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in self.kinds.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(kind.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for EventKindSet {
    type Err = ConfigError;

    /// Parses a comma-separated list such as `"create,delete"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kinds = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse::<ChangeKind>)
            .collect::<Result<Vec<ChangeKind>, _>>()?;
        Self::new(kinds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_parse() {
        assert_eq!("create".parse::<ChangeKind>().ok(), Some(ChangeKind::Create));
        assert_eq!("MODIFY".parse::<ChangeKind>().ok(), Some(ChangeKind::Modify));
        assert_eq!(" deleted ".parse::<ChangeKind>().ok(), Some(ChangeKind::Delete));
        assert!(matches!(
            "rename".parse::<ChangeKind>(),
            Err(ConfigError::UnknownEventKind(name)) if name == "rename"
        ));
    }

    #[test]
    fn test_change_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ChangeKind::Delete).unwrap(),
            r#""delete""#
        );
        let parsed: ChangeKind = serde_json::from_str(r#""modify""#).unwrap();
        assert_eq!(parsed, ChangeKind::Modify);
    }

    #[test]
    fn test_event_kind_set_rejects_empty() {
        assert!(matches!(
            EventKindSet::new(Vec::new()),
            Err(ConfigError::EmptyEventKinds)
        ));
    }

    #[test]
    fn test_event_kind_set_dedups_and_orders() {
        let kinds = EventKindSet::new([
            ChangeKind::Delete,
            ChangeKind::Create,
            ChangeKind::Delete,
        ])
        .unwrap();
        assert_eq!(kinds.len(), 2);
        assert_eq!(
            kinds.iter().collect::<Vec<_>>(),
            vec![ChangeKind::Create, ChangeKind::Delete]
        );
    }

    #[test]
    fn test_event_kind_set_all() {
        let kinds = EventKindSet::all();
        assert!(ChangeKind::ALL.iter().all(|k| kinds.contains(*k)));
        assert_eq!(kinds.to_string(), "create,modify,delete");
    }

    #[test]
    fn test_event_kind_set_from_str() {
        let kinds: EventKindSet = "modify, create".parse().unwrap();
        assert_eq!(kinds.to_string(), "create,modify");

        assert!(matches!(
            "".parse::<EventKindSet>(),
            Err(ConfigError::EmptyEventKinds)
        ));
        assert!("create,bogus".parse::<EventKindSet>().is_err());
    }
}
