//! Weir - Stream Bus
//!
//! The named, typed channel-graph connecting consumers to producers.
//!
//! # Architecture
//!
//! ```text
//! [Consumers]                  [StreamBus]                  [Producers]
//!    Socket ───┐                                         ┌──→ File
//!    Profiler ─┼──→ dispatch ──→ [Filters] ──→ [Formatters] ──→ Console
//!    Console ──┘                    per-stream chains       └──→ Socket
//! ```
//!
//! # Key Design
//!
//! - **Interned stream names**: every stream name resolves once to a
//!   [`StreamId`]; the hot path works on ids only.
//! - **Frozen at startup**: [`BusBuilder`] collects streams, chains and
//!   subscriptions, then [`BusBuilder::freeze`] produces an immutable
//!   [`StreamBus`] - routing reads are lock-free thereafter.
//! - **Deep-copy fan-out**: every subscriber but the last gets a pooled
//!   clone; there is no payload aliasing across producers.
//! - **Bounded channels**: each subscriber is a bounded
//!   `tokio::sync::mpsc` sender; overflow follows the stream's policy
//!   (block, drop, or reroute to its fallback stream).
//! - **Loop detection**: a message arriving on the stream it was just
//!   rerouted from goes to `"_DROPPED_"` instead of cycling.

mod builder;
mod bus;
mod error;
mod metrics;
mod stream;

pub use builder::BusBuilder;
pub use bus::StreamBus;
pub use error::BusError;
pub use metrics::{BusMetrics, BusSnapshot};
pub use stream::{ChannelTimeout, OverflowPolicy, SendOutcome, Stream, Subscriber};

// Re-export key types from dependencies for convenience
pub use weir_message::{Message, MessagePool, StreamId};

use bytes::BytesMut;
use weir_config::{ConfigError, PluginConfig};

/// Default capacity for a producer's inbound channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8192;

/// Trait for stream filters
///
/// Filters decide whether a message may pass down a stream. They run on
/// the routing hot path and must be non-blocking; anything that needs
/// I/O belongs in a producer.
pub trait Filter: Send + Sync {
    /// Consume recognized options from the declaring config
    fn configure(&mut self, _conf: &mut PluginConfig) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Whether this message may pass; the first filter rejecting a
    /// message drops it
    fn accepts(&self, msg: &Message) -> bool;

    /// Name of this filter for logging
    fn name(&self) -> &'static str;
}

impl std::fmt::Debug for dyn Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter").field("name", &self.name()).finish()
    }
}

/// Trait for stream formatters
///
/// Formatters produce a new payload for each message passing a stream.
/// Like filters they run on the hot path and must be non-blocking.
pub trait Formatter: Send + Sync {
    /// Consume recognized options from the declaring config
    fn configure(&mut self, _conf: &mut PluginConfig) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Write the new payload into `out` (a cleared pool buffer)
    fn format(&self, msg: &Message, out: &mut BytesMut);

    /// Name of this formatter for logging
    fn name(&self) -> &'static str;
}
