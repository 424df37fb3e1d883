//! Plugin declarations and YAML loading
//!
//! The top-level config document is a sequence of single-key maps, each
//! mapping a dotted class name to its settings. Declaration order is
//! preserved because it determines instantiation order in the supervisor.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{ConfigError, Result, Value};

/// One plugin declaration from the config file
///
/// `Enable` is stripped at parse time because non-plugin logic hangs off
/// it: a disabled declaration is never handed to the registry at all.
#[derive(Debug, Clone)]
pub struct PluginDecl {
    /// Dotted class name, e.g. `"consumer.Socket"`
    pub class: String,

    /// Whether this instance should be created (default true)
    pub enable: bool,

    /// All remaining settings, as declared
    pub settings: BTreeMap<String, Value>,
}

/// The full parsed configuration: plugin declarations in file order
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Declarations in the order they appear in the file
    pub plugins: Vec<PluginDecl>,
}

impl Config {
    /// Load a configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    /// Parse a configuration from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)?;

        let seq = match doc {
            serde_yaml::Value::Sequence(seq) => seq,
            serde_yaml::Value::Null => Vec::new(),
            other => {
                return Err(ConfigError::NotASequence {
                    found: yaml_type_name(&other),
                });
            }
        };

        let mut plugins = Vec::with_capacity(seq.len());

        for (index, entry) in seq.into_iter().enumerate() {
            let mapping = match entry {
                serde_yaml::Value::Mapping(m) if m.len() == 1 => m,
                _ => return Err(ConfigError::MalformedDeclaration { index }),
            };

            // Single-entry map: class name -> settings
            let (class_value, settings_value) = mapping
                .into_iter()
                .next()
                .expect("mapping verified non-empty");

            let class = match class_value {
                serde_yaml::Value::String(s) => s,
                _ => return Err(ConfigError::MalformedDeclaration { index }),
            };

            let settings_tree = match settings_value {
                serde_yaml::Value::Null => Value::Map(BTreeMap::new()),
                other => Value::from_yaml(other, &class)?,
            };

            let mut settings = match settings_tree {
                Value::Map(m) => m,
                _ => return Err(ConfigError::MalformedDeclaration { index }),
            };

            let enable = match settings.remove("Enable") {
                None => true,
                Some(Value::Bool(b)) => b,
                Some(other) => {
                    return Err(ConfigError::invalid_option(
                        &class,
                        "Enable",
                        "bool",
                        other.type_name(),
                    ));
                }
            };

            plugins.push(PluginDecl {
                class,
                enable,
                settings,
            });
        }

        Ok(Config { plugins })
    }

    /// Declarations that are enabled, with their original index
    pub fn enabled(&self) -> impl Iterator<Item = (usize, &PluginDecl)> {
        self.plugins
            .iter()
            .enumerate()
            .filter(|(_, decl)| decl.enable)
    }
}

fn yaml_type_name(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "bool",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let config = Config::from_str(
            r#"
- "consumer.Profiler":
    Runs: 100
    Stream: "profile"

- "producer.Null":
    Stream: ["profile"]
"#,
        )
        .unwrap();

        assert_eq!(config.plugins.len(), 2);
        assert_eq!(config.plugins[0].class, "consumer.Profiler");
        assert!(config.plugins[0].enable);
        assert_eq!(
            config.plugins[0].settings.get("Runs"),
            Some(&Value::Int(100))
        );
        assert_eq!(config.plugins[1].class, "producer.Null");
    }

    #[test]
    fn test_enable_stripped() {
        let config = Config::from_str(
            r#"
- "consumer.Console":
    Enable: false
"#,
        )
        .unwrap();

        assert!(!config.plugins[0].enable);
        assert!(!config.plugins[0].settings.contains_key("Enable"));
        assert_eq!(config.enabled().count(), 0);
    }

    #[test]
    fn test_enable_wrong_type() {
        let err = Config::from_str(
            r#"
- "consumer.Console":
    Enable: "yes"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Enable"));
    }

    #[test]
    fn test_empty_settings() {
        let config = Config::from_str(
            r#"
- "producer.Console":
"#,
        )
        .unwrap();
        assert!(config.plugins[0].settings.is_empty());
    }

    #[test]
    fn test_empty_document() {
        let config = Config::from_str("").unwrap();
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_not_a_sequence() {
        let err = Config::from_str("key: value").unwrap_err();
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn test_two_key_declaration_rejected() {
        let err = Config::from_str(
            r#"
- "consumer.Console": {}
  "producer.Null": {}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MalformedDeclaration { index: 0 }));
    }

    #[test]
    fn test_declaration_order_preserved() {
        let config = Config::from_str(
            r#"
- "stream.Route":
    Stream: "a"
- "consumer.Console": {}
- "producer.Console": {}
"#,
        )
        .unwrap();
        let classes: Vec<_> = config.plugins.iter().map(|p| p.class.as_str()).collect();
        assert_eq!(
            classes,
            vec!["stream.Route", "consumer.Console", "producer.Console"]
        );
    }
}
