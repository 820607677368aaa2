//! Error types for the dw-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration-related
//! errors, including an empty event-kind subscription.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use dw_core::ConfigError;
///
/// let error = ConfigError::EmptyEventKinds;
/// assert!(error.to_string().contains("at least one event kind"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No event kinds were selected.
    ///
    /// A watcher must subscribe to at least one of create, modify, or delete.
    #[error("at least one event kind must be selected (create, modify, delete)")]
    EmptyEventKinds,

    /// An event kind name could not be parsed.
    #[error("unknown event kind '{0}' (expected create, modify, or delete)")]
    UnknownEventKind(String),

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// The configuration file path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}
