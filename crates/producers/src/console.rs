//! Console producer - writes to stdout
//!
//! Writes each payload to stdout, appending a newline when the payload
//! does not already carry one, so unformatted streams still come out
//! line by line.

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufWriter, Stdout};

use weir_config::{ConfigError, PluginConfig};
use weir_message::Message;
use weir_plugin::{PluginControl, Producer, ProducerBase, ProducerEvent, WorkerGroup};

/// Producer writing payloads to stdout
///
/// Configuration:
///
/// ```yaml
/// - "producer.Console":
///     Stream: ["ingest"]
/// ```
pub struct ConsoleProducer {
    base: ProducerBase,
    writer: Option<BufWriter<Stdout>>,
}

impl ConsoleProducer {
    /// Create an unconfigured instance
    pub fn new() -> Self {
        Self {
            base: ProducerBase::new(),
            writer: None,
        }
    }

    async fn write(&mut self, msg: Message) {
        let writer = self
            .writer
            .get_or_insert_with(|| BufWriter::new(tokio::io::stdout()));

        let payload = msg.payload();
        let result = async {
            writer.write_all(payload).await?;
            if payload.last() != Some(&b'\n') {
                writer.write_all(b"\n").await?;
            }
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(err) = result {
            tracing::error!(producer = %self.base.id(), error = %err, "stdout write failed");
        }
    }

    async fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush().await {
                tracing::error!(producer = %self.base.id(), error = %err, "stdout flush failed");
            }
        }
    }
}

impl Default for ConsoleProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for ConsoleProducer {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)
    }

    async fn produce(&mut self, _workers: &WorkerGroup) {
        loop {
            match self.base.next_event().await {
                ProducerEvent::Message(msg) => {
                    self.write(msg).await;
                    self.flush().await;
                }
                ProducerEvent::Control(PluginControl::StopGraceful) => {
                    for msg in self.base.drain() {
                        self.write(msg).await;
                    }
                    self.flush().await;
                    break;
                }
                ProducerEvent::Control(signal) if signal.is_stop() => {
                    self.flush().await;
                    break;
                }
                ProducerEvent::Control(_) => {}
            }
        }

        tracing::info!(producer = %self.base.id(), "console producer finished");
    }

    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }
}
