//! Envelope formatter

use bytes::BytesMut;

use weir_bus::Formatter;
use weir_config::{ConfigError, PluginConfig};
use weir_message::Message;

/// Formatter wrapping the payload in a prefix and postfix
///
/// Configuration:
///
/// ```yaml
/// - "stream.Route":
///     Stream: "ingest"
///     Formatter: ["format.Envelope"]
///     Prefix: "log | "
///     Postfix: "\n"
/// ```
///
/// The postfix defaults to a newline so line-oriented producers get
/// framed records without their own framing step.
#[derive(Debug)]
pub struct EnvelopeFormatter {
    prefix: Vec<u8>,
    postfix: Vec<u8>,
}

impl EnvelopeFormatter {
    /// Create with the default empty prefix and newline postfix
    pub fn new() -> Self {
        Self {
            prefix: Vec::new(),
            postfix: b"\n".to_vec(),
        }
    }
}

impl Default for EnvelopeFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for EnvelopeFormatter {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.prefix = conf.get_string("Prefix", "")?.into_bytes();
        self.postfix = conf.get_string("Postfix", "\n")?.into_bytes();
        Ok(())
    }

    fn format(&self, msg: &Message, out: &mut BytesMut) {
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(msg.payload());
        out.extend_from_slice(&self.postfix);
    }

    fn name(&self) -> &'static str {
        "format.Envelope"
    }
}
