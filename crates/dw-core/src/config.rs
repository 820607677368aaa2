//! Configuration structures for dirwatch.
//!
//! - [`WatchConfig`] - which roots to watch, how, and for which change kinds
//! - [`Config`] - root configuration, loadable from a JSON file
//!
//! All configuration types implement [`Default`]; missing fields in a
//! configuration file fall back to those defaults.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::kind::{ChangeKind, EventKindSet};

/// Configuration for the directory watcher.
///
/// # Examples
///
/// ```
/// use dw_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert!(config.recursive);
/// assert_eq!(config.events.len(), 3);
/// assert!(config.roots.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Change kinds to subscribe to.
    ///
    /// Must contain at least one entry.
    pub events: Vec<ChangeKind>,

    /// Whether roots are watched together with all of their subdirectories.
    pub recursive: bool,

    /// Directories to watch.
    pub roots: Vec<Utf8PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            events: ChangeKind::ALL.to_vec(),
            recursive: true,
            roots: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Builds the [`EventKindSet`] described by [`events`](Self::events).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyEventKinds`] if `events` is empty.
    pub fn event_kinds(&self) -> Result<EventKindSet, ConfigError> {
        EventKindSet::new(self.events.iter().copied())
    }
}

/// Root configuration for dirwatch.
///
/// # Examples
///
/// ```
/// use dw_core::Config;
///
/// let config = Config::from_json_str(r#"{"watch": {"recursive": false}}"#).unwrap();
/// assert!(!config.watch.recursive);
/// assert_eq!(config.watch.events.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory watcher configuration.
    pub watch: WatchConfig,
}

impl Config {
    /// Parses a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Checks that the configuration can be used to start a watcher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyEventKinds`] if no event kinds are set, or
    /// [`ConfigError::InvalidOption`] if a root path is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watch.event_kinds()?;

        if self.watch.roots.iter().any(|root| root.as_str().is_empty()) {
            return Err(ConfigError::invalid_option(
                "watch.roots",
                "root paths must not be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert!(config.recursive);
        assert_eq!(config.events, ChangeKind::ALL.to_vec());
        assert!(config.roots.is_empty());
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let config =
            Config::from_json_str(r#"{"watch": {"events": ["delete"], "roots": ["/srv/dic"]}}"#)
                .unwrap();
        assert_eq!(config.watch.events, vec![ChangeKind::Delete]);
        assert_eq!(config.watch.roots, vec![Utf8PathBuf::from("/srv/dic")]);
        assert!(config.watch.recursive);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        insta::assert_snapshot!(
            serde_json::to_string(&config).unwrap(),
            @r#"{"watch":{"events":["create","modify","delete"],"recursive":true,"roots":[]}}"#
        );
    }

    #[test]
    fn test_validate_rejects_empty_events() {
        let config = Config::from_json_str(r#"{"watch": {"events": []}}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyEventKinds)
        ));
    }

    #[test]
    fn test_validate_rejects_empty_root() {
        let config = Config::from_json_str(r#"{"watch": {"roots": [""]}}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_json_str(r#"{"watch": {"events": ["rename"]}}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("dirwatch.json")).unwrap();
        fs::write(&path, r#"{"watch": {"recursive": false}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.watch.recursive);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Utf8Path::new("/nonexistent/dirwatch.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
