//! Weir - Transforms
//!
//! The built-in filter and formatter set, attached to streams via
//! `stream.Route` declarations.
//!
//! # Design Principles
//!
//! - **Fast**: filters and formatters run on the routing hot path and
//!   should add microseconds, not milliseconds
//! - **Non-blocking**: never touch I/O or locks that can park a worker
//! - **Thread-safe**: the same instance may be called from several
//!   consumers concurrently
//!
//! # Built-ins
//!
//! Filters:
//! - `filter.All` - accept everything (the default chain)
//! - `filter.RegExp` - accept by regular expression match
//! - `filter.Rate` - cap a stream at N messages per second
//!
//! Formatters:
//! - `format.Forward` - identity, payload passes unchanged
//! - `format.Envelope` - wrap the payload in a prefix/postfix
//! - `format.Timestamp` - prepend the message timestamp
//! - `format.Sequence` - prepend the sequence number

pub mod filter;
pub mod format;

pub use filter::{AllFilter, RateFilter, RegExpFilter};
pub use format::{EnvelopeFormatter, ForwardFormatter, SequenceFormatter, TimestampFormatter};
