//! Bus construction
//!
//! All stream graph mutation happens here, before the pipeline starts:
//! name interning, stream attributes, filter/formatter chains and
//! producer subscriptions. `freeze` validates the reroute graph and
//! produces the immutable [`StreamBus`] the hot path runs on.

use std::collections::HashMap;
use std::sync::Arc;

use weir_config::{DROPPED_STREAM, WILDCARD_STREAM};
use weir_message::{MessagePool, StreamId};

use crate::bus::StreamBus;
use crate::metrics::{BusMetrics, OverflowTracker};
use crate::stream::{ChannelTimeout, OverflowPolicy, Stream, Subscriber};
use crate::{BusError, Filter, Formatter};

struct StreamDraft {
    name: Arc<str>,
    filters: Vec<Box<dyn Filter>>,
    formatters: Vec<Box<dyn Formatter>>,
    subscribers: Vec<Subscriber>,
    timeout: ChannelTimeout,
    policy: OverflowPolicy,
    drop_to: StreamId,
}

impl StreamDraft {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            filters: Vec::new(),
            formatters: Vec::new(),
            subscribers: Vec::new(),
            timeout: ChannelTimeout::TryOnce,
            policy: OverflowPolicy::Block,
            drop_to: StreamId::DROPPED,
        }
    }
}

/// Builder for the frozen stream bus
///
/// Streams are created lazily on first reference; the two reserved
/// streams exist from the start. The supervisor owns the builder
/// exclusively, so no locking is needed until the graph is frozen.
pub struct BusBuilder {
    ids: HashMap<Arc<str>, StreamId>,
    streams: Vec<StreamDraft>,
    pool: Arc<MessagePool>,
}

impl BusBuilder {
    /// Create a builder with the reserved streams interned
    pub fn new(pool: Arc<MessagePool>) -> Self {
        let mut builder = Self {
            ids: HashMap::new(),
            streams: Vec::new(),
            pool,
        };

        let wildcard = builder.stream_id(WILDCARD_STREAM);
        let dropped = builder.stream_id(DROPPED_STREAM);
        debug_assert_eq!(wildcard, StreamId::WILDCARD);
        debug_assert_eq!(dropped, StreamId::DROPPED);

        builder
    }

    /// Intern a stream name, creating the stream on first reference
    pub fn stream_id(&mut self, name: &str) -> StreamId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }

        let id = StreamId::new(self.streams.len() as u32);
        let name: Arc<str> = Arc::from(name);
        self.ids.insert(Arc::clone(&name), id);
        self.streams.push(StreamDraft::new(name));
        id
    }

    /// Look up a name without creating the stream
    pub fn lookup(&self, name: &str) -> Option<StreamId> {
        self.ids.get(name).copied()
    }

    /// Attach a filter to the end of a stream's chain
    pub fn add_filter(&mut self, id: StreamId, filter: Box<dyn Filter>) {
        self.streams[id.as_usize()].filters.push(filter);
    }

    /// Attach a formatter to the end of a stream's chain
    pub fn add_formatter(&mut self, id: StreamId, formatter: Box<dyn Formatter>) {
        self.streams[id.as_usize()].formatters.push(formatter);
    }

    /// Set the timeout for blocking sends on a stream
    pub fn set_timeout(&mut self, id: StreamId, timeout: ChannelTimeout) {
        self.streams[id.as_usize()].timeout = timeout;
    }

    /// Set the overflow policy of a stream
    pub fn set_policy(&mut self, id: StreamId, policy: OverflowPolicy) {
        self.streams[id.as_usize()].policy = policy;
    }

    /// Set the fallback stream rerouted messages go to
    pub fn set_drop_to(&mut self, id: StreamId, drop_to: StreamId) {
        self.streams[id.as_usize()].drop_to = drop_to;
    }

    /// Subscribe a producer endpoint to a stream
    ///
    /// Subscription order is delivery order; the last subscriber of a
    /// stream receives the original message, earlier ones get clones.
    pub fn subscribe(&mut self, id: StreamId, subscriber: Subscriber) {
        self.streams[id.as_usize()].subscribers.push(subscriber);
    }

    /// Number of streams interned so far (including the reserved two)
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Validate the graph and produce the immutable bus
    ///
    /// Fails if `DropToStream` chains form a cycle; a message caught in
    /// such a cycle would reroute forever, so this is detected before
    /// any worker starts.
    pub fn freeze(self) -> Result<Arc<StreamBus>, BusError> {
        self.check_reroute_cycles()?;

        let streams = self
            .streams
            .into_iter()
            .enumerate()
            .map(|(index, draft)| {
                Arc::new(Stream {
                    name: draft.name,
                    id: StreamId::new(index as u32),
                    subscribers: draft.subscribers,
                    filters: draft.filters,
                    formatters: draft.formatters,
                    timeout: draft.timeout,
                    policy: draft.policy,
                    drop_to: draft.drop_to,
                })
            })
            .collect();

        Ok(Arc::new(StreamBus::new(
            streams,
            self.ids,
            self.pool,
            Arc::new(BusMetrics::new()),
            OverflowTracker::new(),
        )))
    }

    /// Walk every `drop_to` chain; a revisit before reaching
    /// `"_DROPPED_"` is a cycle
    fn check_reroute_cycles(&self) -> Result<(), BusError> {
        for start in 0..self.streams.len() {
            let mut path = vec![start];
            let mut current = start;

            loop {
                let next = self.streams[current].drop_to.as_usize();
                if next == StreamId::DROPPED.as_usize() {
                    break;
                }
                if let Some(position) = path.iter().position(|&seen| seen == next) {
                    let names: Vec<&str> = path[position..]
                        .iter()
                        .chain(std::iter::once(&next))
                        .map(|&index| self.streams[index].name.as_ref())
                        .collect();
                    return Err(BusError::RerouteCycle {
                        path: names.join(" -> "),
                    });
                }
                path.push(next);
                current = next;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> BusBuilder {
        BusBuilder::new(Arc::new(MessagePool::new()))
    }

    #[test]
    fn test_reserved_streams_preinterned() {
        let builder = builder();
        assert_eq!(builder.lookup("*"), Some(StreamId::WILDCARD));
        assert_eq!(builder.lookup("_DROPPED_"), Some(StreamId::DROPPED));
        assert_eq!(builder.stream_count(), 2);
    }

    #[test]
    fn test_interning_is_stable() {
        let mut builder = builder();
        let a = builder.stream_id("ingest");
        let b = builder.stream_id("ingest");
        assert_eq!(a, b);
        assert_eq!(a, StreamId::new(2));
        assert_eq!(builder.lookup("absent"), None);
    }

    #[test]
    fn test_freeze_without_cycles() {
        let mut builder = builder();
        let a = builder.stream_id("a");
        let b = builder.stream_id("b");
        builder.set_drop_to(a, b);
        // b falls back to _DROPPED_ by default

        let bus = builder.freeze().unwrap();
        assert_eq!(bus.stream_id("a"), Some(a));
    }

    #[test]
    fn test_freeze_detects_cycle() {
        let mut builder = builder();
        let a = builder.stream_id("a");
        let b = builder.stream_id("b");
        builder.set_drop_to(a, b);
        builder.set_drop_to(b, a);

        let err = builder.freeze().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("a -> b -> a") || text.contains("b -> a -> b"), "{text}");
    }

    #[test]
    fn test_freeze_detects_self_cycle() {
        let mut builder = builder();
        let a = builder.stream_id("a");
        builder.set_drop_to(a, a);

        assert!(builder.freeze().is_err());
    }
}
