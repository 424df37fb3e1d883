//! Null producer - discards all messages
//!
//! Receives messages, updates counters, and drops the data. Useful for
//! measuring pure routing throughput without sink bottlenecks, and for
//! validating stream wiring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use weir_config::{ConfigError, PluginConfig};
use weir_plugin::{PluginControl, Producer, ProducerBase, ProducerEvent, WorkerGroup};

/// Counters kept by the null producer
#[derive(Debug, Default)]
struct NullMetrics {
    messages: AtomicU64,
    bytes: AtomicU64,
}

/// Point-in-time snapshot of null producer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullMetricsSnapshot {
    pub messages: u64,
    pub bytes: u64,
}

/// Producer discarding every received message
pub struct NullProducer {
    base: ProducerBase,
    metrics: Arc<NullMetrics>,
}

impl NullProducer {
    /// Create an unconfigured instance
    pub fn new() -> Self {
        Self {
            base: ProducerBase::new(),
            metrics: Arc::new(NullMetrics::default()),
        }
    }

    /// Snapshot of discarded message counters
    pub fn snapshot(&self) -> NullMetricsSnapshot {
        NullMetricsSnapshot {
            messages: self.metrics.messages.load(Ordering::Relaxed),
            bytes: self.metrics.bytes.load(Ordering::Relaxed),
        }
    }

    fn record(&self, len: usize) {
        self.metrics.messages.fetch_add(1, Ordering::Relaxed);
        self.metrics.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }
}

impl Default for NullProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for NullProducer {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)
    }

    async fn produce(&mut self, _workers: &WorkerGroup) {
        loop {
            match self.base.next_event().await {
                ProducerEvent::Message(msg) => self.record(msg.payload().len()),
                ProducerEvent::Control(PluginControl::StopGraceful) => {
                    for msg in self.base.drain() {
                        self.record(msg.payload().len());
                    }
                    break;
                }
                ProducerEvent::Control(signal) if signal.is_stop() => break,
                ProducerEvent::Control(_) => {}
            }
        }

        let snapshot = self.snapshot();
        tracing::info!(
            producer = %self.base.id(),
            messages = snapshot.messages,
            bytes = snapshot.bytes,
            "null producer finished"
        );
    }

    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }
}
