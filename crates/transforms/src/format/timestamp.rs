//! Timestamp formatter

use bytes::BytesMut;

use weir_bus::Formatter;
use weir_config::{ConfigError, PluginConfig};
use weir_message::Message;

const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f | ";

/// Formatter prepending the message timestamp
///
/// `TimestampFormat` takes a chrono format string; the default renders
/// as `2024-05-01 13:37:00.123 | `.
#[derive(Debug)]
pub struct TimestampFormatter {
    format: String,
}

impl TimestampFormatter {
    /// Create with the default format
    pub fn new() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

impl Default for TimestampFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for TimestampFormatter {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.format = conf.get_string("TimestampFormat", DEFAULT_FORMAT)?;
        Ok(())
    }

    fn format(&self, msg: &Message, out: &mut BytesMut) {
        let stamp = msg.timestamp().format(&self.format).to_string();
        out.extend_from_slice(stamp.as_bytes());
        out.extend_from_slice(msg.payload());
    }

    fn name(&self) -> &'static str {
        "format.Timestamp"
    }
}
