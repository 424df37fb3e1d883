//! Typed plugin option access
//!
//! [`PluginConfig`] is the view a plugin gets of its own declaration.
//! Getters apply the caller's default when a key is absent, fail on type
//! mismatches, and record every key they touch. After configuration the
//! supervisor calls [`PluginConfig::unused_keys`] and warns about
//! declared-but-never-consumed options, which is how typos surface
//! without failing startup.

use std::collections::{BTreeMap, HashSet};

use crate::{ConfigError, PluginDecl, Result, Value};

/// The dropped-messages stream every plugin can fall back to
pub const DROPPED_STREAM: &str = "_DROPPED_";

/// The wildcard stream that sees a copy of all routed traffic
pub const WILDCARD_STREAM: &str = "*";

/// Typed view over one plugin declaration
///
/// Values returned by getters are copies; downstream code cannot mutate
/// shared config state.
#[derive(Debug)]
pub struct PluginConfig {
    class: String,
    id: String,
    settings: BTreeMap<String, Value>,
    consumed: HashSet<&'static str>,
}

impl PluginConfig {
    /// Build the typed view for the `index`-th declaration
    ///
    /// The instance id comes from the `ID` setting when present, otherwise
    /// it is derived from the class name and declaration position so logs
    /// and metrics stay distinguishable.
    pub fn new(decl: &PluginDecl, index: usize) -> Result<Self> {
        let mut config = Self {
            class: decl.class.clone(),
            id: String::new(),
            settings: decl.settings.clone(),
            consumed: HashSet::new(),
        };

        let auto_id = format!("{}#{}", decl.class, index);
        config.id = config.get_string("ID", &auto_id)?;
        Ok(config)
    }

    /// Class name of the declaration this config belongs to
    #[inline]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Stable instance id for logging and metrics
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check whether a key was declared (does not mark it consumed)
    #[inline]
    pub fn has(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    /// Get a string option, or `default` if absent
    pub fn get_string(&mut self, key: &'static str, default: &str) -> Result<String> {
        self.consumed.insert(key);
        match self.settings.get(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.type_error(key, "string", other)),
        }
    }

    /// Get an integer option, or `default` if absent
    pub fn get_int(&mut self, key: &'static str, default: i64) -> Result<i64> {
        self.consumed.insert(key);
        match self.settings.get(key) {
            None => Ok(default),
            Some(Value::Int(i)) => Ok(*i),
            Some(other) => Err(self.type_error(key, "int", other)),
        }
    }

    /// Get a non-negative integer option as usize, or `default` if absent
    pub fn get_usize(&mut self, key: &'static str, default: usize) -> Result<usize> {
        let raw = self.get_int(key, default as i64)?;
        usize::try_from(raw)
            .map_err(|_| ConfigError::invalid_value(&self.id, key, "must not be negative"))
    }

    /// Get a boolean option, or `default` if absent
    pub fn get_bool(&mut self, key: &'static str, default: bool) -> Result<bool> {
        self.consumed.insert(key);
        match self.settings.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(self.type_error(key, "bool", other)),
        }
    }

    /// Get a string-or-list option as a list of strings
    ///
    /// A single string is treated as a one-element list, so
    /// `Stream: "s"` and `Stream: ["s"]` are equivalent.
    pub fn get_string_list(&mut self, key: &'static str, default: &[&str]) -> Result<Vec<String>> {
        self.consumed.insert(key);
        match self.settings.get(key) {
            None => Ok(default.iter().map(|s| s.to_string()).collect()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.type_error(key, "list of strings", other)),
                })
                .collect(),
            Some(other) => Err(self.type_error(key, "string or list of strings", other)),
        }
    }

    /// Streams this plugin produces to / consumes from
    ///
    /// Defaults to the wildcard stream when not declared.
    pub fn stream_names(&mut self) -> Result<Vec<String>> {
        self.get_string_list("Stream", &[WILDCARD_STREAM])
    }

    /// Fallback stream for rerouted overflow, default `"_DROPPED_"`
    pub fn drop_stream(&mut self) -> Result<String> {
        self.get_string("DropToStream", DROPPED_STREAM)
    }

    /// Fuse this plugin binds to, if any
    pub fn fuse_name(&mut self) -> Result<Option<String>> {
        let name = self.get_string("Fuse", "")?;
        Ok(if name.is_empty() { None } else { Some(name) })
    }

    /// Declared keys that no getter ever touched
    ///
    /// The supervisor surfaces these as warnings; an unknown option never
    /// fails startup.
    pub fn unused_keys(&self) -> Vec<String> {
        let mut unused: Vec<String> = self
            .settings
            .keys()
            .filter(|key| !self.consumed.contains(key.as_str()))
            .cloned()
            .collect();
        unused.sort();
        unused
    }

    fn type_error(&self, key: &'static str, expected: &'static str, found: &Value) -> ConfigError {
        ConfigError::invalid_option(&self.id, key, expected, found.type_name())
    }
}
