//! Supervisor error types
//!
//! Everything here is a configuration error: reported before any
//! worker starts, and fatal to the daemon.

use thiserror::Error;

use weir_bus::BusError;
use weir_config::ConfigError;
use weir_plugin::{PluginKind, RegistryError};

/// Errors raised while building a pipeline
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Invalid option value or type in a declaration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unknown class or kind mismatch
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Invalid stream graph (reroute cycle)
    #[error(transparent)]
    Bus(#[from] BusError),

    /// A filter/formatter class used as a top-level declaration
    #[error(
        "plugin class '{class}' is a {kind}; filters and formatters are attached via stream.Route"
    )]
    TransformAtTopLevel {
        /// The offending class
        class: String,
        /// What the registry says it is
        kind: PluginKind,
    },

    /// A `stream.*` class other than `stream.Route`
    #[error("unknown stream declaration '{class}', only stream.Route is supported")]
    UnknownStreamClass {
        /// The offending class
        class: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_at_top_level_display() {
        let err = RunnerError::TransformAtTopLevel {
            class: "filter.RegExp".into(),
            kind: PluginKind::Filter,
        };
        assert!(err.to_string().contains("filter.RegExp"));
        assert!(err.to_string().contains("stream.Route"));
    }
}
