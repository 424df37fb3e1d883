//! Weir - Message
//!
//! The in-flight message record and the buffer pool backing its payload.
//!
//! # Design
//!
//! - **Value semantics**: a [`Message`] owns its payload; fan-out always
//!   deep-copies via [`Message::clone_for_fanout`], so no payload bytes
//!   are ever shared between two consumers of the bus.
//! - **Pooled buffers**: payloads live in [`bytes::BytesMut`] buffers
//!   borrowed from a [`MessagePool`]. Dropping a message returns its
//!   buffer, so steady-state traffic allocates nothing.
//! - **Small header**: routing state is four words - current stream,
//!   origin stream (survives reroutes), previous stream (loop
//!   detection) and the per-source sequence number.
//!
//! # Example
//!
//! ```ignore
//! let pool = Arc::new(MessagePool::new());
//! let msg = Message::new(&pool, b"payload", stream_id, 0);
//! let copy = msg.clone_for_fanout();   // independent pooled buffer
//! drop(copy);                          // buffer goes back to the pool
//! ```

mod message;
mod pool;
mod stream_id;

pub use message::Message;
pub use pool::{MessagePool, PoolMetrics, PoolSnapshot};
pub use stream_id::StreamId;
