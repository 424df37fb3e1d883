//! Built-in stream formatters

mod envelope;
mod forward;
mod sequence;
mod timestamp;

pub use envelope::EnvelopeFormatter;
pub use forward::ForwardFormatter;
pub use sequence::SequenceFormatter;
pub use timestamp::TimestampFormatter;
