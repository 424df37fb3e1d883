//! Weir - Consumers
//!
//! The built-in ingress adapters. Each consumer composes a
//! [`weir_plugin::ConsumerBase`], starts its I/O workers in `consume`,
//! and blocks in the control loop until stopped.
//!
//! # Built-ins
//!
//! - `consumer.Console` - newline-delimited messages from stdin
//! - `consumer.Profiler` - synthetic load generator with rate reporting
//! - `consumer.Socket` - newline-delimited TCP or datagram UDP ingress

mod console;
mod profiler;
mod socket;

pub use console::ConsoleConsumer;
pub use profiler::ProfilerConsumer;
pub use socket::SocketConsumer;
