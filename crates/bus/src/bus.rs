//! The frozen stream bus and its routing algorithm
//!
//! This is the hot path. Everything reachable from `dispatch` is
//! read-only: stream lookup is an array index, subscriber lists are
//! fixed, and the only allocations are pooled payload copies for
//! fan-out.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use weir_message::{Message, MessagePool, StreamId};

use crate::metrics::{BusMetrics, OverflowTracker};
use crate::stream::{OverflowPolicy, SendOutcome, Stream, Subscriber};

/// The immutable stream graph plus the routing algorithm
///
/// Produced by [`crate::BusBuilder::freeze`]; shared as an
/// `Arc<StreamBus>` between all consumers.
pub struct StreamBus {
    streams: Vec<Arc<Stream>>,
    ids: HashMap<Arc<str>, StreamId>,
    pool: Arc<MessagePool>,
    metrics: Arc<BusMetrics>,
    overflow: OverflowTracker,
}

impl StreamBus {
    pub(crate) fn new(
        streams: Vec<Arc<Stream>>,
        ids: HashMap<Arc<str>, StreamId>,
        pool: Arc<MessagePool>,
        metrics: Arc<BusMetrics>,
        overflow: OverflowTracker,
    ) -> Self {
        Self {
            streams,
            ids,
            pool,
            metrics,
            overflow,
        }
    }

    /// Resolve a stream name interned before the freeze
    pub fn stream_id(&self, name: &str) -> Option<StreamId> {
        self.ids.get(name).copied()
    }

    /// The name a stream id was interned from
    pub fn stream_name(&self, id: StreamId) -> Option<&str> {
        self.streams.get(id.as_usize()).map(|s| s.name())
    }

    /// The stream with this id
    pub fn stream(&self, id: StreamId) -> Option<&Arc<Stream>> {
        self.streams.get(id.as_usize())
    }

    /// Number of streams in the frozen graph
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// The payload buffer pool
    #[inline]
    pub fn pool(&self) -> &Arc<MessagePool> {
        &self.pool
    }

    /// The bus counters
    #[inline]
    pub fn metrics(&self) -> &Arc<BusMetrics> {
        &self.metrics
    }

    /// Submit one message to its stream
    ///
    /// After this returns the caller no longer owns the message: it was
    /// delivered, rerouted, or dropped. Reroutes are processed
    /// iteratively so a chain of fallback streams cannot recurse.
    pub async fn dispatch(&self, msg: Message) {
        self.metrics.record_dispatched();

        let mut pending = VecDeque::with_capacity(1);
        pending.push_back(msg);

        while let Some(next) = pending.pop_front() {
            self.route(next, &mut pending).await;
        }
    }

    /// Route one message on its current stream
    async fn route(&self, mut msg: Message, pending: &mut VecDeque<Message>) {
        let stream = match self.streams.get(msg.stream().as_usize()) {
            Some(stream) => Arc::clone(stream),
            None => {
                // Ids come from interning, so this indicates a bug
                tracing::error!(stream = %msg.stream(), "message on unknown stream id");
                self.metrics.record_dropped();
                return;
            }
        };

        if stream.id == StreamId::DROPPED {
            self.route_dropped(msg);
            return;
        }

        // Loop detection runs before anything else: a message coming
        // back to the stream it was rerouted from would cycle forever.
        if msg.prev_stream() == Some(stream.id) {
            self.metrics.record_loop_detected();
            tracing::debug!(
                stream = %stream.name(),
                sequence = msg.sequence(),
                "reroute loop detected"
            );
            self.route_dropped(msg);
            return;
        }

        // Filter chain: first rejection drops the message
        for filter in &stream.filters {
            if !filter.accepts(&msg) {
                self.metrics.record_filtered();
                tracing::trace!(
                    stream = %stream.name(),
                    filter = filter.name(),
                    "message rejected by filter"
                );
                return;
            }
        }

        // Formatter chain: each step produces a new pooled payload
        for formatter in &stream.formatters {
            let mut out = self.pool.get(msg.payload().len());
            formatter.format(&msg, &mut out);
            msg.replace_payload(out);
        }

        let subscribers = &stream.subscribers;
        if subscribers.is_empty() {
            if stream.id == StreamId::WILDCARD {
                // Nothing listens on "*": terminal discard
                self.metrics.record_dropped();
                return;
            }
            tracing::trace!(stream = %stream.name(), "no subscribers, dropping message");
            self.route_dropped(msg);
            return;
        }

        // The fan-out below consumes the original, so the copy for the
        // wildcard pass is taken first.
        let wildcard = &self.streams[StreamId::WILDCARD.as_usize()];
        let wildcard_copy = if stream.id != StreamId::WILDCARD && !wildcard.subscribers.is_empty()
        {
            Some(msg.clone_for_fanout())
        } else {
            None
        };

        // Fan-out: every subscriber but the last gets a pooled clone,
        // the last receives the original.
        let (last, rest) = subscribers
            .split_last()
            .expect("subscriber list verified non-empty");

        for subscriber in rest {
            let copy = msg.clone_for_fanout();
            if self.offer(&stream, subscriber, copy, pending).await {
                self.metrics.record_delivered();
            }
        }
        if self.offer(&stream, last, msg, pending).await {
            self.metrics.record_delivered();
        }

        // Wildcard subscribers see a copy of all delivered traffic
        if let Some(copy) = wildcard_copy {
            let (last, rest) = wildcard
                .subscribers
                .split_last()
                .expect("wildcard subscribers verified non-empty");

            for subscriber in rest {
                let extra = copy.clone_for_fanout();
                if self.offer(wildcard, subscriber, extra, pending).await {
                    self.metrics.record_wildcard_copy();
                }
            }
            if self.offer(wildcard, last, copy, pending).await {
                self.metrics.record_wildcard_copy();
            }
        }
    }

    /// Offer one message to one subscriber under the stream's policy
    ///
    /// Returns true if the subscriber took the message. On rejection the
    /// message follows the policy: discarded under `Drop`, otherwise
    /// readdressed to the stream's fallback and queued for resubmission.
    async fn offer(
        &self,
        stream: &Stream,
        subscriber: &Subscriber,
        msg: Message,
        pending: &mut VecDeque<Message>,
    ) -> bool {
        // A burned fuse or a dead producer counts as a full channel.
        if !subscriber.is_active() || subscriber.is_closed() {
            self.fallback(stream, msg, pending);
            return false;
        }

        let outcome = match stream.policy {
            OverflowPolicy::Drop | OverflowPolicy::Reroute => subscriber.try_send(msg),
            OverflowPolicy::Block => {
                let timeout = subscriber.timeout_override().unwrap_or(stream.timeout);
                subscriber.send(msg, timeout).await
            }
        };

        match outcome {
            SendOutcome::Delivered => true,
            SendOutcome::Rejected(msg) => {
                self.overflow.record(stream.name());
                match stream.policy {
                    OverflowPolicy::Drop => {
                        self.metrics.record_dropped();
                    }
                    OverflowPolicy::Reroute | OverflowPolicy::Block => {
                        self.fallback(stream, msg, pending);
                    }
                }
                false
            }
        }
    }

    /// Readdress a rejected message to the stream's fallback
    fn fallback(&self, stream: &Stream, mut msg: Message, pending: &mut VecDeque<Message>) {
        if stream.drop_to != StreamId::DROPPED {
            self.metrics.record_rerouted();
        }
        msg.reroute(stream.drop_to);
        pending.push_back(msg);
    }

    /// Deliver a message onto `"_DROPPED_"`: counted, one attempt per
    /// subscriber, no chains, no wildcard, no further fallback
    fn route_dropped(&self, mut msg: Message) {
        self.metrics.record_dropped();
        msg.set_stream(StreamId::DROPPED);

        let stream = &self.streams[StreamId::DROPPED.as_usize()];
        let subscribers = &stream.subscribers;

        let Some((last, rest)) = subscribers.split_last() else {
            return;
        };

        for subscriber in rest {
            let copy = msg.clone_for_fanout();
            let _ = subscriber.try_send(copy);
        }
        let _ = last.try_send(msg);
    }
}

impl std::fmt::Debug for StreamBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBus")
            .field("streams", &self.streams.len())
            .finish()
    }
}
