//! Socket consumer - TCP and UDP ingress
//!
//! Listens on `Address` (`"tcp://host:port"` or `"udp://host:port"`).
//! TCP connections are read as newline-delimited records, each line
//! becoming one message; UDP treats every datagram as one message.
//!
//! When attached to a fuse, a burn tears the listener (and all open
//! connections) down; re-activation boots it again, mirroring how the
//! backends behind the fuse come and go.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;

use weir_config::{ConfigError, PluginConfig};
use weir_plugin::{Consumer, ConsumerBase, Emitter, PluginControl, WorkerGroup};

const DEFAULT_ADDRESS: &str = "tcp://0.0.0.0:5880";

/// Read buffer per TCP connection
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Largest UDP datagram we accept
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Tcp,
    Udp,
}

fn parse_address(raw: &str, plugin: &str) -> Result<(Protocol, String), ConfigError> {
    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("tcp", raw),
    };

    match scheme {
        "tcp" => Ok((Protocol::Tcp, rest.to_string())),
        "udp" => Ok((Protocol::Udp, rest.to_string())),
        other => Err(ConfigError::invalid_value(
            plugin,
            "Address",
            format!("unknown protocol '{}', expected tcp or udp", other),
        )),
    }
}

/// Consumer accepting messages from a TCP or UDP socket
///
/// Configuration:
///
/// ```yaml
/// - "consumer.Socket":
///     Address: "tcp://0.0.0.0:5880"
///     Stream: ["ingest"]
///     Fuse: "ingest-backend"
/// ```
pub struct SocketConsumer {
    base: ConsumerBase,
    protocol: Protocol,
    address: String,
    boot_token: Option<CancellationToken>,
}

impl SocketConsumer {
    /// Create an unconfigured instance
    pub fn new() -> Self {
        Self {
            base: ConsumerBase::new(),
            protocol: Protocol::Tcp,
            address: String::new(),
            boot_token: None,
        }
    }

    /// Start the listener worker for the current boot
    fn boot(&mut self, workers: &WorkerGroup) {
        let token = CancellationToken::new();
        let emitter = self.base.emitter();
        let id = self.base.id().to_string();
        let address = self.address.clone();

        match self.protocol {
            Protocol::Tcp => {
                workers.spawn(run_tcp(address, emitter, token.clone(), id));
            }
            Protocol::Udp => {
                workers.spawn(run_udp(address, emitter, token.clone(), id));
            }
        }

        self.boot_token = Some(token);
    }

    /// Tear down the listener and every open connection
    fn halt(&mut self) {
        if let Some(token) = self.boot_token.take() {
            token.cancel();
        }
    }
}

impl Default for SocketConsumer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Consumer for SocketConsumer {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)?;
        let plugin = conf.id().to_string();
        let raw = conf.get_string("Address", DEFAULT_ADDRESS)?;
        let (protocol, address) = parse_address(&raw, &plugin)?;
        self.protocol = protocol;
        self.address = address;
        Ok(())
    }

    async fn consume(&mut self, workers: &WorkerGroup) {
        self.boot(workers);

        loop {
            match self.base.next_control().await {
                signal if signal.is_stop() => {
                    self.halt();
                    break;
                }
                PluginControl::FuseBurn => self.halt(),
                PluginControl::FuseActive => self.boot(workers),
                PluginControl::Roll => {}
                _ => {}
            }
        }
    }

    fn base(&self) -> &ConsumerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConsumerBase {
        &mut self.base
    }
}

async fn run_tcp(address: String, emitter: Emitter, token: CancellationToken, id: String) {
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(consumer = %id, address = %address, error = %err, "tcp bind failed");
            return;
        }
    };
    tracing::info!(consumer = %id, address = %address, "tcp listener started");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::debug!(consumer = %id, peer = %peer, "connection accepted");
                    let emitter = emitter.clone();
                    let token = token.clone();
                    tokio::spawn(read_lines(socket, emitter, token));
                }
                Err(err) => {
                    tracing::warn!(consumer = %id, error = %err, "accept failed");
                }
            }
        }
    }

    tracing::info!(consumer = %id, "tcp listener stopped");
}

/// Read newline-delimited records from one connection
async fn read_lines(mut socket: TcpStream, emitter: Emitter, token: CancellationToken) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            read = socket.read_buf(&mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let mut line = buf.split_to(pos + 1);
                        // Strip the delimiter and an optional CR
                        line.truncate(line.len() - 1);
                        if line.last() == Some(&b'\r') {
                            line.truncate(line.len() - 1);
                        }
                        if !line.is_empty() {
                            emitter.enqueue(&line).await;
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "connection read failed");
                    break;
                }
            }
        }
    }
}

async fn run_udp(address: String, emitter: Emitter, token: CancellationToken, id: String) {
    let socket = match UdpSocket::bind(&address).await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::error!(consumer = %id, address = %address, error = %err, "udp bind failed");
            return;
        }
    };
    tracing::info!(consumer = %id, address = %address, "udp listener started");

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _peer)) => {
                    if len > 0 {
                        emitter.enqueue(&buf[..len]).await;
                    }
                }
                Err(err) => {
                    tracing::warn!(consumer = %id, error = %err, "udp receive failed");
                }
            }
        }
    }

    tracing::info!(consumer = %id, "udp listener stopped");
}
