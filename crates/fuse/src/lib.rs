//! Weir - Fuse
//!
//! Named health primitive coupling a group of plugins to a shared
//! backend availability signal.
//!
//! # Contract
//!
//! - A plugin that detects its backend is down *burns* the fuse; every
//!   plugin bound to that fuse gets its burn callback invoked exactly
//!   once and stops accepting work.
//! - The fuse stays burned until every registered health check reports
//!   healthy; the transition back fires every activate callback exactly
//!   once.
//! - Transitions are serialized per fuse: burn callbacks finish before
//!   the next activate begins. Callbacks run with the state lock
//!   released, so a callback may burn a *different* fuse without
//!   deadlocking. A callback must not burn or activate its own fuse.
//!
//! # Example
//!
//! ```
//! use weir_fuse::FuseRegistry;
//!
//! let registry = FuseRegistry::new();
//! let fuse = registry.get("db");
//!
//! fuse.on_burn(|| println!("db down, halting writes"));
//! fuse.on_activate(|| println!("db back, resuming"));
//! fuse.register_check(|| true);
//!
//! assert!(fuse.burn());
//! assert!(fuse.is_burned());
//! assert!(!fuse.burn());          // repeated burn is a no-op
//! assert!(fuse.try_activate());   // all checks healthy
//! assert!(!fuse.is_burned());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Callback = Arc<dyn Fn() + Send + Sync>;
type HealthCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// A named fuse: burned or active, with bound callbacks
pub struct Fuse {
    name: String,
    burned: AtomicBool,

    /// Serializes burn/activate including callback execution
    transition: Mutex<()>,

    /// Callback lists; held only long enough to snapshot
    callbacks: Mutex<Callbacks>,
}

#[derive(Default)]
struct Callbacks {
    on_burn: Vec<Callback>,
    on_activate: Vec<Callback>,
    checks: Vec<HealthCheck>,
}

impl Fuse {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            burned: AtomicBool::new(false),
            transition: Mutex::new(()),
            callbacks: Mutex::new(Callbacks::default()),
        }
    }

    /// The fuse name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether traffic should currently halt
    #[inline]
    pub fn is_burned(&self) -> bool {
        self.burned.load(Ordering::Acquire)
    }

    /// Register a callback fired on the active -> burned transition
    pub fn on_burn(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.lock().on_burn.push(Arc::new(callback));
    }

    /// Register a callback fired on the burned -> active transition
    pub fn on_activate(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.lock().on_activate.push(Arc::new(callback));
    }

    /// Register a health check; all checks must pass before the fuse
    /// re-activates
    pub fn register_check(&self, check: impl Fn() -> bool + Send + Sync + 'static) {
        self.callbacks.lock().checks.push(Arc::new(check));
    }

    /// Burn the fuse
    ///
    /// Returns true if this call performed the active -> burned
    /// transition; a burn while already burned is a no-op.
    pub fn burn(&self) -> bool {
        if self.is_burned() {
            return false;
        }

        let _serialized = self.transition.lock();
        if self.burned.swap(true, Ordering::AcqRel) {
            return false;
        }

        tracing::warn!(fuse = %self.name, "fuse burned");

        for callback in self.snapshot_burn_callbacks() {
            callback();
        }
        true
    }

    /// Attempt the burned -> active transition
    ///
    /// Runs every registered health check; the fuse re-activates only if
    /// all of them pass. Returns true if the fuse is active afterwards.
    pub fn try_activate(&self) -> bool {
        if !self.is_burned() {
            return true;
        }

        let _serialized = self.transition.lock();
        if !self.burned.load(Ordering::Acquire) {
            return true;
        }

        let checks = {
            let callbacks = self.callbacks.lock();
            callbacks.checks.clone()
        };

        if !checks.iter().all(|check| check()) {
            tracing::debug!(fuse = %self.name, "health check failed, fuse stays burned");
            return false;
        }

        self.burned.store(false, Ordering::Release);
        tracing::info!(fuse = %self.name, "fuse re-activated");

        let activate = {
            let callbacks = self.callbacks.lock();
            callbacks.on_activate.clone()
        };
        for callback in activate {
            callback();
        }
        true
    }

    fn snapshot_burn_callbacks(&self) -> Vec<Callback> {
        self.callbacks.lock().on_burn.clone()
    }
}

impl std::fmt::Debug for Fuse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fuse")
            .field("name", &self.name)
            .field("burned", &self.is_burned())
            .finish()
    }
}

/// Registry of fuses, keyed by name, created on first reference
///
/// Owned by the supervisor and shared with plugin bases as an
/// `Arc<FuseRegistry>`; fuses live for the pipeline lifetime.
#[derive(Default)]
pub struct FuseRegistry {
    fuses: Mutex<HashMap<String, Arc<Fuse>>>,
}

impl FuseRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the fuse with this name, creating it if absent
    pub fn get(&self, name: &str) -> Arc<Fuse> {
        let mut fuses = self.fuses.lock();
        Arc::clone(
            fuses
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Fuse::new(name))),
        )
    }

    /// Number of fuses created so far
    pub fn len(&self) -> usize {
        self.fuses.lock().len()
    }

    /// Whether any fuse has been created
    pub fn is_empty(&self) -> bool {
        self.fuses.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_get_returns_same_fuse() {
        let registry = FuseRegistry::new();
        let a = registry.get("db");
        let b = registry.get("db");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_burn_fires_callbacks_exactly_once() {
        let registry = FuseRegistry::new();
        let fuse = registry.get("db");

        let burns = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&burns);
        fuse.on_burn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(fuse.burn());
        assert!(!fuse.burn());
        assert!(!fuse.burn());
        assert_eq!(burns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_activate_requires_all_checks() {
        let fuse = FuseRegistry::new().get("db");
        let healthy = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&healthy);
        fuse.register_check(move || flag.load(Ordering::SeqCst));
        fuse.register_check(|| true);

        fuse.burn();
        assert!(!fuse.try_activate());
        assert!(fuse.is_burned());

        healthy.store(true, Ordering::SeqCst);
        assert!(fuse.try_activate());
        assert!(!fuse.is_burned());
    }

    #[test]
    fn test_activate_callbacks_balance_transitions() {
        let fuse = FuseRegistry::new().get("db");
        let activations = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&activations);
        fuse.on_activate(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // try_activate on an active fuse is a no-op
        assert!(fuse.try_activate());
        assert_eq!(activations.load(Ordering::SeqCst), 0);

        for _ in 0..3 {
            fuse.burn();
            fuse.try_activate();
        }
        assert_eq!(activations.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_callback_may_burn_other_fuse() {
        let registry = Arc::new(FuseRegistry::new());
        let upstream = registry.get("upstream");
        let downstream = registry.get("downstream");

        let cascade = Arc::clone(&downstream);
        upstream.on_burn(move || {
            cascade.burn();
        });

        upstream.burn();
        assert!(upstream.is_burned());
        assert!(downstream.is_burned());
    }

    #[test]
    fn test_concurrent_burns_transition_once() {
        let fuse = Arc::new(FuseRegistry::new()).get("db");
        let transitions = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let fuse = Arc::clone(&fuse);
            let transitions = Arc::clone(&transitions);
            handles.push(std::thread::spawn(move || {
                if fuse.burn() {
                    transitions.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(transitions.load(Ordering::SeqCst), 1);
    }
}
