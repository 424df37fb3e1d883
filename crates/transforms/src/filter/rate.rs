//! Message rate filter
//!
//! Caps a stream at `MessagesPerSec` messages per wall-clock second;
//! anything above the cap in the current second is rejected (and
//! therefore dropped by the bus). Counting is a pair of atomics, so the
//! filter never blocks the routing path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use weir_bus::Filter;
use weir_config::{ConfigError, PluginConfig};
use weir_message::Message;

const DEFAULT_MESSAGES_PER_SEC: i64 = 100;

/// Filter limiting messages per second
///
/// Configuration:
///
/// ```yaml
/// - "stream.Route":
///     Stream: "chatty"
///     Filter: ["filter.Rate"]
///     MessagesPerSec: 500
/// ```
pub struct RateFilter {
    limit: u64,
    started: Instant,
    window: AtomicU64,
    count: AtomicU64,
}

impl RateFilter {
    /// Create the filter with the default limit
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_MESSAGES_PER_SEC as u64,
            started: Instant::now(),
            window: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn current_window(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for RateFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for RateFilter {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        let plugin = conf.id().to_string();
        let limit = conf.get_int("MessagesPerSec", DEFAULT_MESSAGES_PER_SEC)?;
        if limit <= 0 {
            return Err(ConfigError::invalid_value(
                plugin,
                "MessagesPerSec",
                "must be positive",
            ));
        }
        self.limit = limit as u64;
        Ok(())
    }

    fn accepts(&self, _msg: &Message) -> bool {
        let window = self.current_window();
        let seen = self.window.load(Ordering::Relaxed);

        // New second: reset the counter. A racing reset double-clears
        // at worst, which briefly under-counts, never blocks.
        if window != seen
            && self
                .window
                .compare_exchange(seen, window, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            self.count.store(0, Ordering::Relaxed);
        }

        self.count.fetch_add(1, Ordering::Relaxed) < self.limit
    }

    fn name(&self) -> &'static str {
        "filter.Rate"
    }
}
