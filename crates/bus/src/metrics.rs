//! Bus metrics
//!
//! Atomic counters recorded on the routing hot path plus a rate-limited
//! logger for overflow events, so a saturated producer cannot flood the
//! daemon's own log.
//!
//! For a pipeline with single-subscriber streams and no wildcard
//! subscribers, `delivered + dropped == dispatched` holds after a
//! graceful drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Counters recorded by the stream bus
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// Messages submitted via `dispatch`
    pub dispatched: AtomicU64,

    /// Successful sends to subscribers of regular streams
    pub delivered: AtomicU64,

    /// Messages that ended without delivery: filtered, discarded under
    /// the Drop policy, or routed to `"_DROPPED_"`
    pub dropped: AtomicU64,

    /// Messages rejected by a filter chain (also counted in `dropped`)
    pub filtered: AtomicU64,

    /// Messages readdressed to a fallback stream
    pub rerouted: AtomicU64,

    /// Reroute loops cut by the previous-stream check
    pub loops_detected: AtomicU64,

    /// Extra copies delivered to wildcard subscribers
    pub wildcard_copies: AtomicU64,
}

impl BusMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            rerouted: AtomicU64::new(0),
            loops_detected: AtomicU64::new(0),
            wildcard_copies: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rerouted(&self) {
        self.rerouted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_loop_detected(&self) {
        self.loops_detected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_wildcard_copy(&self) {
        self.wildcard_copies.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            rerouted: self.rerouted.load(Ordering::Relaxed),
            loops_detected: self.loops_detected.load(Ordering::Relaxed),
            wildcard_copies: self.wildcard_copies.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of bus counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusSnapshot {
    pub dispatched: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub filtered: u64,
    pub rerouted: u64,
    pub loops_detected: u64,
    pub wildcard_copies: u64,
}

/// Rate-limited overflow logging
///
/// Aggregates overflow events and emits at most one warning per second
/// with the number of messages affected since the last log line.
pub(crate) struct OverflowTracker {
    last_log: Mutex<Instant>,
    suppressed: AtomicU64,
}

const LOG_INTERVAL: Duration = Duration::from_secs(1);

impl OverflowTracker {
    pub(crate) fn new() -> Self {
        Self {
            last_log: Mutex::new(Instant::now() - LOG_INTERVAL),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Record one overflow on `stream`; logs if the interval elapsed
    pub(crate) fn record(&self, stream: &str) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);

        let mut last = self.last_log.lock();
        if last.elapsed() >= LOG_INTERVAL {
            *last = Instant::now();
            drop(last);

            let count = self.suppressed.swap(0, Ordering::Relaxed);
            tracing::warn!(
                stream = %stream,
                messages = count,
                "subscriber channel overflow"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_counts_as_dropped() {
        let metrics = BusMetrics::new();
        metrics.record_filtered();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.filtered, 1);
        assert_eq!(snapshot.dropped, 1);
    }

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = BusMetrics::new();
        metrics.record_dispatched();
        metrics.record_dispatched();
        metrics.record_delivered();
        metrics.record_rerouted();
        metrics.record_loop_detected();
        metrics.record_wildcard_copy();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dispatched, 2);
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.rerouted, 1);
        assert_eq!(snapshot.loops_detected, 1);
        assert_eq!(snapshot.wildcard_copies, 1);
    }
}
