//! Consumer base state
//!
//! `ConsumerBase` carries the shared ingress machinery: output stream
//! bindings, the control channel, the per-source sequence counter and
//! the optional fuse. Adapters compose it and only implement their I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use weir_bus::StreamBus;
use weir_config::{ConfigError, PluginConfig};
use weir_fuse::Fuse;
use weir_message::{Message, StreamId};

use crate::control::{ControlHandle, PluginControl, ShutdownRequest, CONTROL_CHANNEL_CAPACITY};

/// Shared state composed into every consumer
pub struct ConsumerBase {
    id: Arc<str>,
    stream_names: Vec<String>,
    fuse_name: Option<String>,
    fuse_timeout: Duration,
    fuse: Option<Arc<Fuse>>,

    control: ControlHandle,
    control_rx: mpsc::Receiver<PluginControl>,

    sequence: Arc<AtomicU64>,
    emitter: Option<Emitter>,
    shutdown: Option<ShutdownRequest>,
}

impl ConsumerBase {
    /// Create unconfigured base state
    pub fn new() -> Self {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let id: Arc<str> = Arc::from("");

        Self {
            id: Arc::clone(&id),
            stream_names: Vec::new(),
            fuse_name: None,
            fuse_timeout: Duration::from_secs(10),
            fuse: None,
            control: ControlHandle::new(id, control_tx),
            control_rx,
            sequence: Arc::new(AtomicU64::new(0)),
            emitter: None,
            shutdown: None,
        }
    }

    /// Consume the common consumer settings
    ///
    /// Adapters call this first from their own `configure`.
    pub fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        let id: Arc<str> = Arc::from(conf.id());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);

        self.id = Arc::clone(&id);
        self.control = ControlHandle::new(id, control_tx);
        self.control_rx = control_rx;
        self.stream_names = conf.stream_names()?;
        self.fuse_name = conf.fuse_name()?;
        self.fuse_timeout = Duration::from_secs(conf.get_usize("FuseTimeoutSec", 10)? as u64);
        Ok(())
    }

    /// Instance id, for logging
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Output stream names from the declaration
    #[inline]
    pub fn stream_names(&self) -> &[String] {
        &self.stream_names
    }

    /// Fuse name from the declaration, if bound
    #[inline]
    pub fn fuse_name(&self) -> Option<&str> {
        self.fuse_name.as_deref()
    }

    /// Re-check interval for the bound fuse
    #[inline]
    pub fn fuse_timeout(&self) -> Duration {
        self.fuse_timeout
    }

    /// Attach the fuse resolved by the supervisor
    pub fn bind_fuse(&mut self, fuse: Arc<Fuse>) {
        self.fuse = Some(fuse);
    }

    /// The bound fuse, if any
    #[inline]
    pub fn fuse(&self) -> Option<&Arc<Fuse>> {
        self.fuse.as_ref()
    }

    /// Wire the frozen bus and resolved stream ids into this consumer
    ///
    /// Called by the supervisor after the bus freeze, before start.
    pub fn bind(&mut self, bus: Arc<StreamBus>, streams: Vec<StreamId>, shutdown: ShutdownRequest) {
        self.emitter = Some(Emitter {
            bus,
            streams: streams.into(),
            sequence: Arc::clone(&self.sequence),
        });
        self.shutdown = Some(shutdown);
    }

    /// A clonable emitter for this consumer's I/O workers
    ///
    /// # Panics
    ///
    /// Panics if called before the supervisor bound the bus; adapters
    /// only see a bound base.
    pub fn emitter(&self) -> Emitter {
        self.emitter
            .clone()
            .expect("consumer used before the supervisor bound the bus")
    }

    /// Control handle for the supervisor and fuse callbacks
    #[inline]
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Block until the next control signal
    ///
    /// A closed control channel reads as `StopImmediate` so a consumer
    /// never outlives its supervisor.
    pub async fn next_control(&mut self) -> PluginControl {
        self.control_rx
            .recv()
            .await
            .unwrap_or(PluginControl::StopImmediate)
    }

    /// Ask the supervisor for a daemon-wide graceful stop
    ///
    /// Used by finite sources once their input is exhausted.
    pub fn request_shutdown(&self) {
        if let Some(shutdown) = &self.shutdown {
            shutdown.request();
        }
    }

    /// Clonable shutdown handle for I/O workers that outlive `consume`
    pub fn shutdown_handle(&self) -> Option<ShutdownRequest> {
        self.shutdown.clone()
    }
}

impl Default for ConsumerBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap clonable handle for enqueuing messages onto the bus
///
/// Consumers hand clones to each of their I/O workers; sequence numbers
/// stay monotone across all of them because the counter is shared.
#[derive(Clone)]
pub struct Emitter {
    bus: Arc<StreamBus>,
    streams: Arc<[StreamId]>,
    sequence: Arc<AtomicU64>,
}

impl Emitter {
    /// Enqueue one payload onto every bound stream
    pub async fn enqueue(&self, payload: &[u8]) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.enqueue_with_sequence(payload, sequence).await;
    }

    /// Enqueue with an adapter-supplied sequence number
    pub async fn enqueue_with_sequence(&self, payload: &[u8], sequence: u64) {
        for &stream in self.streams.iter() {
            let msg = Message::new(self.bus.pool(), payload, stream, sequence);
            self.bus.dispatch(msg).await;
        }
    }

    /// The bus this emitter dispatches into
    #[inline]
    pub fn bus(&self) -> &Arc<StreamBus> {
        &self.bus
    }

    /// The bound stream ids
    #[inline]
    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }
}
