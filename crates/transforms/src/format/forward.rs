//! Identity formatter

use bytes::BytesMut;

use weir_bus::Formatter;
use weir_message::Message;

/// Formatter passing the payload through unchanged
#[derive(Debug, Default)]
pub struct ForwardFormatter;

impl ForwardFormatter {
    /// Create the formatter
    pub fn new() -> Self {
        Self
    }
}

impl Formatter for ForwardFormatter {
    fn format(&self, msg: &Message, out: &mut BytesMut) {
        out.extend_from_slice(msg.payload());
    }

    fn name(&self) -> &'static str {
        "format.Forward"
    }
}
