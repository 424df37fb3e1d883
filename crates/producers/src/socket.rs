//! Socket producer - forwards to a downstream TCP endpoint
//!
//! Writes each payload newline-terminated to `Address`. A connect or
//! write failure burns the bound fuse; the health check probes the
//! endpoint until it accepts connections again, then the producer
//! reconnects on the fuse's activate signal.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use weir_config::{ConfigError, PluginConfig};
use weir_message::Message;
use weir_plugin::{PluginControl, Producer, ProducerBase, ProducerEvent, WorkerGroup};

const DEFAULT_ADDRESS: &str = "tcp://127.0.0.1:5880";

/// Timeout for the synchronous health-check probe
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Producer forwarding messages to a TCP endpoint
///
/// Configuration:
///
/// ```yaml
/// - "producer.Socket":
///     Stream: ["forward"]
///     Address: "tcp://collector.internal:5880"
///     Fuse: "collector"
/// ```
pub struct SocketProducer {
    base: ProducerBase,
    address: String,
    connection: Option<TcpStream>,
}

impl SocketProducer {
    /// Create an unconfigured instance
    pub fn new() -> Self {
        Self {
            base: ProducerBase::new(),
            address: String::new(),
            connection: None,
        }
    }

    async fn connect(&mut self) -> bool {
        match TcpStream::connect(&self.address).await {
            Ok(stream) => {
                tracing::info!(
                    producer = %self.base.id(),
                    address = %self.address,
                    "connected"
                );
                self.connection = Some(stream);
                true
            }
            Err(err) => {
                tracing::error!(
                    producer = %self.base.id(),
                    address = %self.address,
                    error = %err,
                    "connect failed"
                );
                self.connection = None;
                false
            }
        }
    }

    async fn write(&mut self, msg: Message) {
        if self.connection.is_none() && !self.connect().await {
            self.base.burn_fuse();
            return;
        }

        let payload = msg.payload();
        let stream = self.connection.as_mut().expect("connected above");
        let result = async {
            stream.write_all(payload).await?;
            if payload.last() != Some(&b'\n') {
                stream.write_all(b"\n").await?;
            }
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(err) = result {
            tracing::error!(
                producer = %self.base.id(),
                address = %self.address,
                error = %err,
                "forward write failed"
            );
            self.connection = None;
            self.base.burn_fuse();
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.connection.take() {
            let _ = stream.shutdown().await;
        }
    }
}

impl Default for SocketProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for SocketProducer {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)?;
        let plugin = conf.id().to_string();
        let raw = conf.get_string("Address", DEFAULT_ADDRESS)?;

        self.address = match raw.split_once("://") {
            Some(("tcp", rest)) => rest.to_string(),
            Some((other, _)) => {
                return Err(ConfigError::invalid_value(
                    plugin,
                    "Address",
                    format!("unknown protocol '{}', expected tcp", other),
                ));
            }
            None => raw,
        };
        Ok(())
    }

    async fn produce(&mut self, _workers: &WorkerGroup) {
        if let Some(fuse) = self.base.fuse() {
            let address = self.address.clone();
            fuse.register_check(move || {
                use std::net::ToSocketAddrs;

                address
                    .to_socket_addrs()
                    .ok()
                    .and_then(|mut addrs| addrs.next())
                    .and_then(|addr| {
                        std::net::TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).ok()
                    })
                    .is_some()
            });
        }

        if !self.connect().await {
            self.base.burn_fuse();
        }

        loop {
            match self.base.next_event().await {
                ProducerEvent::Message(msg) => self.write(msg).await,
                ProducerEvent::Control(PluginControl::StopGraceful) => {
                    for msg in self.base.drain() {
                        self.write(msg).await;
                    }
                    self.disconnect().await;
                    break;
                }
                ProducerEvent::Control(PluginControl::StopImmediate) => {
                    self.disconnect().await;
                    break;
                }
                ProducerEvent::Control(PluginControl::FuseBurn) => self.disconnect().await,
                ProducerEvent::Control(PluginControl::FuseActive) => {
                    self.connect().await;
                }
                ProducerEvent::Control(PluginControl::Roll) => {}
            }
        }

        tracing::info!(
            producer = %self.base.id(),
            address = %self.address,
            "socket producer finished"
        );
    }

    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use weir_message::{MessagePool, StreamId};

    #[test]
    fn test_configure_strips_scheme() {
        let config = weir_config::Config::from_str(
            "- \"producer.Socket\":\n    Address: \"tcp://10.0.0.1:9000\"\n",
        )
        .unwrap();
        let mut conf = PluginConfig::new(&config.plugins[0], 0).unwrap();
        let mut producer = SocketProducer::new();
        producer.configure(&mut conf).unwrap();
        assert_eq!(producer.address, "10.0.0.1:9000");
    }

    #[test]
    fn test_configure_rejects_udp() {
        let config = weir_config::Config::from_str(
            "- \"producer.Socket\":\n    Address: \"udp://10.0.0.1:9000\"\n",
        )
        .unwrap();
        let mut conf = PluginConfig::new(&config.plugins[0], 0).unwrap();
        assert!(SocketProducer::new().configure(&mut conf).is_err());
    }

    #[tokio::test]
    async fn test_forwards_lines() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let _ = socket.read_to_end(&mut received).await;
            received
        });

        let yaml = format!(
            "- \"producer.Socket\":\n    Address: \"tcp://{address}\"\n    Channel: 8\n"
        );
        let config = weir_config::Config::from_str(&yaml).unwrap();
        let mut conf = PluginConfig::new(&config.plugins[0], 0).unwrap();
        let mut producer = SocketProducer::new();
        producer.configure(&mut conf).unwrap();

        let subscriber = producer.base().subscriber();
        let control = producer.base().control();
        let pool = Arc::new(MessagePool::new());
        for payload in [b"alpha" as &[u8], b"beta"] {
            let _ = subscriber.try_send(Message::new(&pool, payload, StreamId::new(2), 0));
        }
        control.signal(PluginControl::StopGraceful);

        producer.produce(&WorkerGroup::new()).await;

        let received = server.await.unwrap();
        assert_eq!(received, b"alpha\nbeta\n");
    }
}
