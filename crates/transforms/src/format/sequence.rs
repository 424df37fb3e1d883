//! Sequence number formatter

use bytes::BytesMut;

use weir_bus::Formatter;
use weir_config::{ConfigError, PluginConfig};
use weir_message::Message;

/// Formatter prepending `<sequence><separator>` to the payload
///
/// Useful for spotting gaps or reordering when debugging a pipeline.
#[derive(Debug)]
pub struct SequenceFormatter {
    separator: Vec<u8>,
}

impl SequenceFormatter {
    /// Create with the default `":"` separator
    pub fn new() -> Self {
        Self {
            separator: b":".to_vec(),
        }
    }
}

impl Default for SequenceFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for SequenceFormatter {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.separator = conf.get_string("SequenceSeparator", ":")?.into_bytes();
        Ok(())
    }

    fn format(&self, msg: &Message, out: &mut BytesMut) {
        out.extend_from_slice(msg.sequence().to_string().as_bytes());
        out.extend_from_slice(&self.separator);
        out.extend_from_slice(msg.payload());
    }

    fn name(&self) -> &'static str {
        "format.Sequence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weir_message::{MessagePool, StreamId};

    #[test]
    fn test_sequence_prepended() {
        let pool = Arc::new(MessagePool::new());
        let msg = Message::new(&pool, b"payload", StreamId::new(2), 42);

        let mut out = BytesMut::new();
        SequenceFormatter::new().format(&msg, &mut out);
        assert_eq!(&out[..], b"42:payload");
    }
}
