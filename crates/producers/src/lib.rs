//! Weir - Producers
//!
//! The built-in egress adapters. Each producer composes a
//! [`weir_plugin::ProducerBase`], loops over its inbound channel and
//! control signals, and writes messages to its backend.
//!
//! # Built-ins
//!
//! - `producer.Console` - writes payloads to stdout
//! - `producer.Null` - discards everything (pipeline benchmarking)
//! - `producer.File` - appends to a file, rotates on `Roll` (SIGHUP)
//! - `producer.Socket` - forwards to a downstream TCP endpoint
//!
//! File and socket producers bind to fuses: a persistent backend
//! failure burns the fuse, upstream traffic follows the stream's
//! overflow fallback, and a periodic health check re-activates the
//! fuse once the backend returns.

mod console;
mod file;
mod null;
mod socket;

pub use console::ConsoleProducer;
pub use file::FileProducer;
pub use null::{NullMetricsSnapshot, NullProducer};
pub use socket::SocketProducer;
