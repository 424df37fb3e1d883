//! Weir - Configuration
//!
//! The configuration tree and the typed option views handed to plugins.
//!
//! # Overview
//!
//! A weir config file is a YAML sequence of plugin declarations. Each
//! declaration is a single-key map from a dotted class name to a settings
//! map:
//!
//! ```yaml
//! - "consumer.Socket":
//!     Address: "tcp://0.0.0.0:5880"
//!     Stream: ["ingest"]
//!
//! - "producer.File":
//!     Stream: ["ingest"]
//!     File: "/var/log/weir/ingest.log"
//! ```
//!
//! The file is parsed once into a [`Config`] holding [`PluginDecl`]s in
//! declaration order. Settings are kept as a tagged [`Value`] tree; the
//! supervisor wraps each declaration in a [`PluginConfig`] which applies
//! defaults, checks types, and records which keys were consumed so typos
//! can be reported after startup.
//!
//! # Modules
//!
//! - `value` - Tagged value tree (null | bool | int | float | string | list | map)
//! - `decl` - Plugin declarations and YAML loading
//! - `plugin_config` - Typed option getters with consumed-key tracking
//! - `error` - Configuration error types

mod decl;
mod error;
mod plugin_config;
mod value;

pub use decl::{Config, PluginDecl};
pub use error::{ConfigError, Result};
pub use plugin_config::{PluginConfig, DROPPED_STREAM, WILDCARD_STREAM};
pub use value::Value;
