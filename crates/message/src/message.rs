//! The in-flight message record
//!
//! Messages are created by consumers, routed by the bus, and destroyed
//! when the last producer has accepted or dropped its copy. The payload
//! buffer is borrowed from the pool and handed back automatically when
//! the message is dropped.

use std::mem;
use std::sync::Arc;

use bytes::BytesMut;
use chrono::{DateTime, Utc};

use crate::{MessagePool, StreamId};

/// A payload-bearing record flowing through the bus
///
/// Value-semantic: once enqueued, a message is not mutated except by the
/// formatter chain, which swaps in a new payload. There is deliberately
/// no `Clone` impl - fan-out goes through [`Message::clone_for_fanout`]
/// so every copy owns an independent pooled buffer.
pub struct Message {
    payload: BytesMut,
    pool: Arc<MessagePool>,
    stream: StreamId,
    orig_stream: StreamId,
    prev_stream: Option<StreamId>,
    sequence: u64,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message addressed to `stream`, deep-copying `payload`
    /// into a pooled buffer
    pub fn new(pool: &Arc<MessagePool>, payload: &[u8], stream: StreamId, sequence: u64) -> Self {
        let mut buf = pool.get(payload.len());
        buf.extend_from_slice(payload);

        Self {
            payload: buf,
            pool: Arc::clone(pool),
            stream,
            orig_stream: stream,
            prev_stream: None,
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Fan-out primitive: a new pool-backed message with the same header
    /// fields and an independent copy of the payload
    pub fn clone_for_fanout(&self) -> Self {
        let mut buf = self.pool.get(self.payload.len());
        buf.extend_from_slice(&self.payload);

        Self {
            payload: buf,
            pool: Arc::clone(&self.pool),
            stream: self.stream,
            orig_stream: self.orig_stream,
            prev_stream: self.prev_stream,
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }

    /// The payload bytes
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Stream this message is currently addressed to
    #[inline]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Stream this message was first enqueued on (survives reroutes)
    #[inline]
    pub fn orig_stream(&self) -> StreamId {
        self.orig_stream
    }

    /// Stream this message was rerouted away from, if any
    #[inline]
    pub fn prev_stream(&self) -> Option<StreamId> {
        self.prev_stream
    }

    /// Sequence number, monotone per source
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Creation timestamp
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Readdress to `to`, stamping the previous stream for loop detection
    #[inline]
    pub fn reroute(&mut self, to: StreamId) {
        self.prev_stream = Some(self.stream);
        self.stream = to;
    }

    /// Readdress without stamping the previous stream
    ///
    /// Used when the bus moves a message onto `"_DROPPED_"`, which is
    /// terminal and exempt from loop detection.
    #[inline]
    pub fn set_stream(&mut self, to: StreamId) {
        self.stream = to;
    }

    /// Swap in a formatted payload, returning the old buffer to the pool
    pub fn replace_payload(&mut self, new_payload: BytesMut) {
        let old = mem::replace(&mut self.payload, new_payload);
        self.pool.put(old);
    }

    /// The pool this message's payload belongs to
    #[inline]
    pub fn pool(&self) -> &Arc<MessagePool> {
        &self.pool
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        self.pool.put(mem::take(&mut self.payload));
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("stream", &self.stream)
            .field("orig_stream", &self.orig_stream)
            .field("prev_stream", &self.prev_stream)
            .field("sequence", &self.sequence)
            .field("len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<MessagePool> {
        Arc::new(MessagePool::new())
    }

    #[test]
    fn test_new_deep_copies() {
        let pool = pool();
        let mut source = b"hello".to_vec();
        let msg = Message::new(&pool, &source, StreamId::new(2), 7);
        source[0] = b'X';

        assert_eq!(msg.payload(), b"hello");
        assert_eq!(msg.stream(), StreamId::new(2));
        assert_eq!(msg.orig_stream(), StreamId::new(2));
        assert_eq!(msg.prev_stream(), None);
        assert_eq!(msg.sequence(), 7);
    }

    #[test]
    fn test_clone_for_fanout_is_independent() {
        let pool = pool();
        let mut msg = Message::new(&pool, b"abc", StreamId::new(2), 0);
        let copy = msg.clone_for_fanout();

        msg.replace_payload({
            let mut buf = pool.get(3);
            buf.extend_from_slice(b"xyz");
            buf
        });

        assert_eq!(msg.payload(), b"xyz");
        assert_eq!(copy.payload(), b"abc");
        assert_eq!(copy.sequence(), msg.sequence());
    }

    #[test]
    fn test_reroute_stamps_previous() {
        let pool = pool();
        let mut msg = Message::new(&pool, b"m", StreamId::new(2), 0);
        msg.reroute(StreamId::new(3));

        assert_eq!(msg.stream(), StreamId::new(3));
        assert_eq!(msg.orig_stream(), StreamId::new(2));
        assert_eq!(msg.prev_stream(), Some(StreamId::new(2)));
    }

    #[test]
    fn test_set_stream_keeps_previous() {
        let pool = pool();
        let mut msg = Message::new(&pool, b"m", StreamId::new(2), 0);
        msg.set_stream(StreamId::DROPPED);

        assert_eq!(msg.stream(), StreamId::DROPPED);
        assert_eq!(msg.prev_stream(), None);
    }

    #[test]
    fn test_drop_returns_buffer() {
        let pool = pool();
        let msg = Message::new(&pool, b"payload", StreamId::new(2), 0);
        drop(msg);

        assert_eq!(pool.available(), 1);
        assert_eq!(pool.metrics().snapshot().returns, 1);
    }

    #[test]
    fn test_replace_payload_returns_old_buffer() {
        let pool = pool();
        let mut msg = Message::new(&pool, b"old", StreamId::new(2), 0);
        let replacement = {
            let mut buf = pool.get(3);
            buf.extend_from_slice(b"new");
            buf
        };
        msg.replace_payload(replacement);

        assert_eq!(msg.payload(), b"new");
        assert_eq!(pool.available(), 1);

        drop(msg);
        assert_eq!(pool.available(), 2);
    }
}
