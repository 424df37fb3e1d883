//! Producer base state
//!
//! `ProducerBase` owns the bounded inbound channel the bus delivers
//! into, the control channel, and the fuse machinery. Adapters loop
//! over [`ProducerBase::next_event`] and write messages to their
//! backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use weir_bus::{ChannelTimeout, Subscriber, DEFAULT_CHANNEL_CAPACITY};
use weir_config::{ConfigError, PluginConfig};
use weir_fuse::Fuse;
use weir_message::Message;

use crate::control::{ControlHandle, PluginControl, CONTROL_CHANNEL_CAPACITY};

/// What a producer's event loop sees next
#[derive(Debug)]
pub enum ProducerEvent {
    /// A message from the inbound channel
    Message(Message),
    /// A control signal
    Control(PluginControl),
}

/// Shared state composed into every producer
pub struct ProducerBase {
    id: Arc<str>,
    stream_names: Vec<String>,
    drop_stream: String,
    capacity: usize,

    subscriber: Option<Subscriber>,
    inbound_rx: Option<mpsc::Receiver<Message>>,
    active: Arc<AtomicBool>,

    control: ControlHandle,
    control_rx: mpsc::Receiver<PluginControl>,

    fuse_name: Option<String>,
    fuse_timeout: Duration,
    fuse: Option<Arc<Fuse>>,
}

impl ProducerBase {
    /// Create unconfigured base state
    pub fn new() -> Self {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let id: Arc<str> = Arc::from("");

        Self {
            id: Arc::clone(&id),
            stream_names: Vec::new(),
            drop_stream: String::new(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
            subscriber: None,
            inbound_rx: None,
            active: Arc::new(AtomicBool::new(true)),
            control: ControlHandle::new(id, control_tx),
            control_rx,
            fuse_name: None,
            fuse_timeout: Duration::from_secs(10),
            fuse: None,
        }
    }

    /// Consume the common producer settings and create the inbound
    /// channel
    ///
    /// Adapters call this first from their own `configure`.
    pub fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        let id: Arc<str> = Arc::from(conf.id());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);

        self.id = Arc::clone(&id);
        self.control = ControlHandle::new(Arc::clone(&id), control_tx);
        self.control_rx = control_rx;
        self.stream_names = conf.stream_names()?;
        self.drop_stream = conf.drop_stream()?;
        self.capacity = conf.get_usize("Channel", DEFAULT_CHANNEL_CAPACITY)?.max(1);
        self.fuse_name = conf.fuse_name()?;
        self.fuse_timeout = Duration::from_secs(conf.get_usize("FuseTimeoutSec", 10)? as u64);

        let timeout_declared = conf.has("ChannelTimeoutMs");
        let timeout_ms = conf.get_int("ChannelTimeoutMs", 0)?;

        let (inbound_tx, inbound_rx) = mpsc::channel(self.capacity);
        let mut subscriber = Subscriber::new(Arc::clone(&id), inbound_tx, self.capacity);
        if timeout_declared {
            subscriber = subscriber.with_timeout(ChannelTimeout::from_millis(timeout_ms));
        }

        self.active = subscriber.activity_flag();
        self.subscriber = Some(subscriber);
        self.inbound_rx = Some(inbound_rx);
        Ok(())
    }

    /// Instance id, for logging
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Streams this producer subscribes to
    #[inline]
    pub fn stream_names(&self) -> &[String] {
        &self.stream_names
    }

    /// Name of the fallback stream for rerouted overflow
    #[inline]
    pub fn drop_stream_name(&self) -> &str {
        &self.drop_stream
    }

    /// Inbound channel capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The subscriber endpoint the supervisor attaches to streams
    ///
    /// # Panics
    ///
    /// Panics if called before `configure`; the supervisor configures
    /// every plugin before wiring.
    pub fn subscriber(&self) -> Subscriber {
        self.subscriber
            .clone()
            .expect("producer wired before configure")
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

    /// Whether the bound fuse is currently burned
    #[inline]
    pub fn is_fuse_burned(&self) -> bool {
        self.fuse.as_ref().is_some_and(|fuse| fuse.is_burned())
    }

    /// Control handle for the supervisor and fuse callbacks
    #[inline]
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Burn the bound fuse and start re-checking it
    ///
    /// Called by adapters when their backend fails persistently. The
    /// first burn spawns a detached task that re-runs the fuse's health
    /// checks every `FuseTimeoutSec` until it re-activates.
    pub fn burn_fuse(&self) {
        let Some(fuse) = self.fuse.as_ref() else {
            return;
        };

        if !fuse.burn() {
            return;
        }

        let fuse = Arc::clone(fuse);
        let interval = self.fuse_timeout;
        let plugin = Arc::clone(&self.id);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                // Health checks may probe sockets or files; keep them
                // off the async workers.
                let probe = Arc::clone(&fuse);
                let activated = tokio::task::spawn_blocking(move || probe.try_activate())
                    .await
                    .unwrap_or(false);

                if activated {
                    break;
                }
                tracing::debug!(plugin = %plugin, fuse = fuse.name(), "fuse still burned");
            }
        });
    }

    /// Block until the next message or control signal
    ///
    /// Control signals win over pending messages. A closed channel on
    /// either side reads as `StopImmediate`.
    pub async fn next_event(&mut self) -> ProducerEvent {
        let inbound = self
            .inbound_rx
            .as_mut()
            .expect("producer run before configure");

        tokio::select! {
            biased;

            signal = self.control_rx.recv() => {
                ProducerEvent::Control(signal.unwrap_or(PluginControl::StopImmediate))
            }
            msg = inbound.recv() => match msg {
                Some(msg) => ProducerEvent::Message(msg),
                None => ProducerEvent::Control(PluginControl::StopImmediate),
            }
        }
    }

    /// Block until the next control signal, leaving messages queued
    ///
    /// For producers that stop accepting work (a burned fuse, a paused
    /// backend) but still need lifecycle signals.
    pub async fn next_control(&mut self) -> PluginControl {
        self.control_rx
            .recv()
            .await
            .unwrap_or(PluginControl::StopImmediate)
    }

    /// Pull every message already queued, without waiting
    ///
    /// The graceful-stop drain: called after `StopGraceful` so pending
    /// messages reach the backend before the worker returns.
    pub fn drain(&mut self) -> Vec<Message> {
        let Some(inbound) = self.inbound_rx.as_mut() else {
            return Vec::new();
        };

        let mut drained = Vec::new();
        while let Ok(msg) = inbound.try_recv() {
            drained.push(msg);
        }
        drained
    }

    /// Mark this producer unable to accept traffic
    ///
    /// While inactive the bus applies the stream's overflow fallback
    /// instead of queueing. Set by fuse burn callbacks.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Whether the subscriber currently accepts traffic
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Default for ProducerBase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_base(yaml: &str) -> ProducerBase {
        let config = weir_config::Config::from_str(yaml).unwrap();
        let mut conf = PluginConfig::new(&config.plugins[0], 0).unwrap();
        let mut base = ProducerBase::new();
        base.configure(&mut conf).unwrap();
        base
    }

    #[test]
    fn test_configure_reads_common_settings() {
        let base = configured_base(
            r#"
- "producer.Test":
    Stream: ["a"]
    DropToStream: "spill"
    Channel: 4
"#,
        );

        assert_eq!(base.id(), "producer.Test#0");
        assert_eq!(base.stream_names(), ["a"]);
        assert_eq!(base.drop_stream_name(), "spill");
        assert_eq!(base.capacity(), 4);
        assert_eq!(base.subscriber().capacity(), 4);
    }

    #[tokio::test]
    async fn test_control_beats_pending_messages() {
        let mut base = configured_base("- \"producer.Test\": {}\n");

        let subscriber = base.subscriber();
        let pool = Arc::new(weir_message::MessagePool::new());
        let msg = Message::new(&pool, b"m", weir_message::StreamId::new(2), 0);
        assert!(matches!(
            subscriber.try_send(msg),
            weir_bus::SendOutcome::Delivered
        ));

        base.control().signal(PluginControl::StopGraceful);

        match base.next_event().await {
            ProducerEvent::Control(PluginControl::StopGraceful) => {}
            other => panic!("expected stop before message, got {:?}", other),
        }

        let drained = base.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].payload(), b"m");
    }

    #[tokio::test]
    async fn test_next_event_yields_messages_in_order() {
        let mut base = configured_base("- \"producer.Test\": {}\n");
        let subscriber = base.subscriber();
        let pool = Arc::new(weir_message::MessagePool::new());

        for i in 0..3u64 {
            let msg = Message::new(&pool, &[b'0' + i as u8], weir_message::StreamId::new(2), i);
            let _ = subscriber.try_send(msg);
        }

        for i in 0..3u64 {
            match base.next_event().await {
                ProducerEvent::Message(msg) => assert_eq!(msg.sequence(), i),
                other => panic!("expected message, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_activity_flag_shared_with_subscriber() {
        let base = configured_base("- \"producer.Test\": {}\n");
        let subscriber = base.subscriber();

        assert!(subscriber.is_active());
        base.set_active(false);
        assert!(!subscriber.is_active());
        base.set_active(true);
        assert!(subscriber.is_active());
    }
}
