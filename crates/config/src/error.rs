//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or interpreting configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse YAML
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The top-level document is not a sequence of plugin declarations
    #[error("config must be a sequence of plugin declarations, found {found}")]
    NotASequence {
        /// Type name of what was found instead
        found: &'static str,
    },

    /// A declaration entry is not a single-key class map
    #[error("declaration #{index} must be a single `\"class.Name\": {{...}}` map")]
    MalformedDeclaration {
        /// Zero-based position in the declaration list
        index: usize,
    },

    /// A mapping key is not a string
    #[error("non-string key in settings of '{class}'")]
    NonStringKey {
        /// Class the settings belong to
        class: String,
    },

    /// An option has the wrong type
    #[error("plugin '{plugin}' option '{key}' expects {expected}, found {found}")]
    InvalidOption {
        /// Plugin instance the option belongs to
        plugin: String,
        /// Option key
        key: &'static str,
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        found: &'static str,
    },

    /// An option has a value outside its valid range
    #[error("plugin '{plugin}' option '{key}' is invalid: {message}")]
    InvalidValue {
        /// Plugin instance the option belongs to
        plugin: String,
        /// Option key
        key: &'static str,
        /// What is wrong with it
        message: String,
    },
}

impl ConfigError {
    /// Create an InvalidOption error
    pub fn invalid_option(
        plugin: impl Into<String>,
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::InvalidOption {
            plugin: plugin.into(),
            key,
            expected,
            found,
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        plugin: impl Into<String>,
        key: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            plugin: plugin.into(),
            key,
            message: message.into(),
        }
    }
}
