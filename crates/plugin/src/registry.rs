//! Type registry - config-driven plugin instantiation
//!
//! Maps dotted class names (`"consumer.Socket"`, `"filter.RegExp"`) to
//! factories producing fresh, unconfigured plugin instances. There is
//! no load-time side-effect registration: the binary assembles the full
//! registry explicitly before the supervisor runs, and the registry is
//! read-only from then on.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use weir_bus::{Filter, Formatter};

use crate::{Consumer, Producer};

type ConsumerFactory = Box<dyn Fn() -> Box<dyn Consumer> + Send + Sync>;
type ProducerFactory = Box<dyn Fn() -> Box<dyn Producer> + Send + Sync>;
type FilterFactory = Box<dyn Fn() -> Box<dyn Filter> + Send + Sync>;
type FormatterFactory = Box<dyn Fn() -> Box<dyn Formatter> + Send + Sync>;

/// What kind of plugin a class name resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Consumer,
    Producer,
    Filter,
    Formatter,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginKind::Consumer => "consumer",
            PluginKind::Producer => "producer",
            PluginKind::Filter => "filter",
            PluginKind::Formatter => "formatter",
        };
        f.write_str(name)
    }
}

enum PluginFactory {
    Consumer(ConsumerFactory),
    Producer(ProducerFactory),
    Filter(FilterFactory),
    Formatter(FormatterFactory),
}

impl PluginFactory {
    fn kind(&self) -> PluginKind {
        match self {
            PluginFactory::Consumer(_) => PluginKind::Consumer,
            PluginFactory::Producer(_) => PluginKind::Producer,
            PluginFactory::Filter(_) => PluginKind::Filter,
            PluginFactory::Formatter(_) => PluginKind::Formatter,
        }
    }
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No factory registered under this class name
    #[error("unknown plugin class '{class}', available: [{known}]")]
    UnknownClass {
        /// The class the config referenced
        class: String,
        /// Comma-separated registered classes
        known: String,
    },

    /// The class exists but is the wrong kind for this position
    #[error("plugin class '{class}' is a {actual}, expected a {expected}")]
    KindMismatch {
        class: String,
        expected: PluginKind,
        actual: PluginKind,
    },
}

/// Process-wide store of plugin factories
///
/// Registration is idempotent: registering a class name that already
/// exists is a no-op returning false, so double-registration of the
/// same adapter set is harmless. Lookups take `&self`; the registry is
/// safe for concurrent read once the binary has built it.
#[derive(Default)]
pub struct TypeRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer class; returns false if the name was taken
    pub fn register_consumer<C, F>(&mut self, class: &str, factory: F) -> bool
    where
        C: Consumer + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let factory: ConsumerFactory = Box::new(move || Box::new(factory()));
        self.insert(class, PluginFactory::Consumer(factory))
    }

    /// Register a producer class; returns false if the name was taken
    pub fn register_producer<P, F>(&mut self, class: &str, factory: F) -> bool
    where
        P: Producer + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let factory: ProducerFactory = Box::new(move || Box::new(factory()));
        self.insert(class, PluginFactory::Producer(factory))
    }

    /// Register a filter class; returns false if the name was taken
    pub fn register_filter<T, F>(&mut self, class: &str, factory: F) -> bool
    where
        T: Filter + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: FilterFactory = Box::new(move || Box::new(factory()));
        self.insert(class, PluginFactory::Filter(factory))
    }

    /// Register a formatter class; returns false if the name was taken
    pub fn register_formatter<T, F>(&mut self, class: &str, factory: F) -> bool
    where
        T: Formatter + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: FormatterFactory = Box::new(move || Box::new(factory()));
        self.insert(class, PluginFactory::Formatter(factory))
    }

    fn insert(&mut self, class: &str, factory: PluginFactory) -> bool {
        if self.factories.contains_key(class) {
            return false;
        }
        self.factories.insert(class.to_string(), factory);
        true
    }

    /// The kind registered under a class name, if any
    pub fn kind_of(&self, class: &str) -> Option<PluginKind> {
        self.factories.get(class).map(PluginFactory::kind)
    }

    /// Whether a class name is registered
    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Registered class names, sorted
    pub fn known_classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        classes.sort_unstable();
        classes
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Create a fresh consumer instance
    pub fn create_consumer(&self, class: &str) -> Result<Box<dyn Consumer>, RegistryError> {
        match self.lookup(class)? {
            PluginFactory::Consumer(factory) => Ok(factory()),
            other => Err(self.mismatch(class, PluginKind::Consumer, other.kind())),
        }
    }

    /// Create a fresh producer instance
    pub fn create_producer(&self, class: &str) -> Result<Box<dyn Producer>, RegistryError> {
        match self.lookup(class)? {
            PluginFactory::Producer(factory) => Ok(factory()),
            other => Err(self.mismatch(class, PluginKind::Producer, other.kind())),
        }
    }

    /// Create a fresh filter instance
    pub fn create_filter(&self, class: &str) -> Result<Box<dyn Filter>, RegistryError> {
        match self.lookup(class)? {
            PluginFactory::Filter(factory) => Ok(factory()),
            other => Err(self.mismatch(class, PluginKind::Filter, other.kind())),
        }
    }

    /// Create a fresh formatter instance
    pub fn create_formatter(&self, class: &str) -> Result<Box<dyn Formatter>, RegistryError> {
        match self.lookup(class)? {
            PluginFactory::Formatter(factory) => Ok(factory()),
            other => Err(self.mismatch(class, PluginKind::Formatter, other.kind())),
        }
    }

    fn lookup(&self, class: &str) -> Result<&PluginFactory, RegistryError> {
        self.factories
            .get(class)
            .ok_or_else(|| RegistryError::UnknownClass {
                class: class.to_string(),
                known: self.known_classes().join(", "),
            })
    }

    fn mismatch(&self, class: &str, expected: PluginKind, actual: PluginKind) -> RegistryError {
        RegistryError::KindMismatch {
            class: class.to_string(),
            expected,
            actual,
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("classes", &self.known_classes())
            .finish()
    }
}
