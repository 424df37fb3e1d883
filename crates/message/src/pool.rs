//! Lock-free message buffer pool
//!
//! Payload buffers are recycled through per-size-class lock-free queues
//! to keep per-message allocation off the hot path. Buckets are keyed by
//! power-of-two capacity from 64 bytes to 1 MiB; payloads larger than
//! the top bucket are allocated directly and never pooled.
//!
//! # Performance
//!
//! - **Get / put**: one lock-free queue operation per call
//! - **Fallback allocation**: only on a pool miss or an oversized payload

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Smallest bucketed capacity (2^6)
const MIN_BUCKET_SHIFT: u32 = 6;

/// Largest bucketed capacity (2^20 = 1 MiB)
const MAX_BUCKET_SHIFT: u32 = 20;

/// Number of size classes
const BUCKET_COUNT: usize = (MAX_BUCKET_SHIFT - MIN_BUCKET_SHIFT + 1) as usize;

/// Default number of buffers retained per size class
const DEFAULT_BUCKET_DEPTH: usize = 128;

/// Pool of reusable payload buffers, bucketed by power-of-two capacity
///
/// Safe for concurrent borrow and return from any number of workers.
/// Returned buffers are cleared but keep their capacity.
pub struct MessagePool {
    buckets: Vec<ArrayQueue<BytesMut>>,
    metrics: PoolMetrics,
}

/// Counters for pool monitoring
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Buffer reused from a bucket
    pub hits: AtomicU64,

    /// Fresh allocation (bucket empty or payload oversized)
    pub misses: AtomicU64,

    /// Buffer returned to a bucket
    pub returns: AtomicU64,

    /// Buffer discarded (bucket full or capacity not a size class)
    pub discards: AtomicU64,
}

impl PoolMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            discards: AtomicU64::new(0),
        }
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pool metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub discards: u64,
}

impl PoolSnapshot {
    /// Fraction of gets served from the pool (1.0 when idle)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl MessagePool {
    /// Create a pool with the default per-bucket depth
    pub fn new() -> Self {
        Self::with_bucket_depth(DEFAULT_BUCKET_DEPTH)
    }

    /// Create a pool retaining at most `depth` buffers per size class
    pub fn with_bucket_depth(depth: usize) -> Self {
        let buckets = (0..BUCKET_COUNT)
            .map(|_| ArrayQueue::new(depth.max(1)))
            .collect();

        Self {
            buckets,
            metrics: PoolMetrics::new(),
        }
    }

    /// Borrow a cleared buffer with capacity for at least `len` bytes
    #[inline]
    pub fn get(&self, len: usize) -> BytesMut {
        match bucket_index(len) {
            Some(index) => match self.buckets[index].pop() {
                Some(buf) => {
                    self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                    buf
                }
                None => {
                    self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                    BytesMut::with_capacity(bucket_capacity(index))
                }
            },
            None => {
                // Oversized payload: allocate exactly, never pooled
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(len)
            }
        }
    }

    /// Return a buffer to its size class
    ///
    /// The buffer is cleared. Buffers whose capacity is not a size class
    /// (oversized, or grown past their class) are dropped instead.
    #[inline]
    pub fn put(&self, mut buf: BytesMut) {
        buf.clear();

        let capacity = buf.capacity();
        if capacity.is_power_of_two() {
            if let Some(index) = exact_bucket_index(capacity) {
                match self.buckets[index].push(buf) {
                    Ok(()) => {
                        self.metrics.returns.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        self.metrics.discards.fetch_add(1, Ordering::Relaxed);
                    }
                }
                return;
            }
        }

        self.metrics.discards.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of buffers currently idle across all buckets
    pub fn available(&self) -> usize {
        self.buckets.iter().map(ArrayQueue::len).sum()
    }

    /// Get reference to metrics
    #[inline]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}

/// Size class serving a payload of `len` bytes, or None if oversized
#[inline]
fn bucket_index(len: usize) -> Option<usize> {
    let capacity = len.max(1 << MIN_BUCKET_SHIFT).next_power_of_two();
    exact_bucket_index(capacity)
}

/// Size class whose capacity is exactly `capacity`, or None
#[inline]
fn exact_bucket_index(capacity: usize) -> Option<usize> {
    let shift = capacity.trailing_zeros();
    if (MIN_BUCKET_SHIFT..=MAX_BUCKET_SHIFT).contains(&shift) {
        Some((shift - MIN_BUCKET_SHIFT) as usize)
    } else {
        None
    }
}

/// Capacity of the size class at `index`
#[inline]
fn bucket_capacity(index: usize) -> usize {
    1 << (MIN_BUCKET_SHIFT + index as u32)
}
