//! Tagged value tree
//!
//! Settings parsed from YAML are kept as a small tagged union so the core
//! never depends on the parser's own value types. Typed access with
//! defaults happens in [`crate::PluginConfig`]; this type only models the
//! raw tree.

use std::collections::BTreeMap;

use crate::ConfigError;

/// A raw configuration value
///
/// The tree is immutable once parsed; getters hand out copies or borrows
/// so no shared config state can be mutated downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null / missing value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer (YAML integers are modeled as i64)
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
    /// Sequence of values
    List(Vec<Value>),
    /// String-keyed mapping
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Human-readable type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Get as bool, if this is a bool
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer, if this is an integer
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as string slice, if this is a string
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as list slice, if this is a list
    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Convert a parsed YAML value into the tagged tree
    ///
    /// Mapping keys must be strings; anything else is a configuration
    /// error (the daemon aborts before starting workers).
    pub fn from_yaml(value: serde_yaml::Value, class: &str) -> Result<Self, ConfigError> {
        match value {
            serde_yaml::Value::Null => Ok(Value::Null),
            serde_yaml::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else {
                    Ok(Value::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            serde_yaml::Value::String(s) => Ok(Value::String(s)),
            serde_yaml::Value::Sequence(seq) => {
                let items = seq
                    .into_iter()
                    .map(|v| Value::from_yaml(v, class))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(items))
            }
            serde_yaml::Value::Mapping(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let key = match k {
                        serde_yaml::Value::String(s) => s,
                        _ => {
                            return Err(ConfigError::NonStringKey {
                                class: class.to_string(),
                            });
                        }
                    };
                    out.insert(key, Value::from_yaml(v, class)?);
                }
                Ok(Value::Map(out))
            }
            serde_yaml::Value::Tagged(tagged) => Value::from_yaml(tagged.value, class),
        }
    }
}
