//! In-memory test adapters
//!
//! A scriptable source and a recording sink, registered into a
//! `TypeRegistry` under test-chosen class names. The factories capture
//! shared handles so the test can drive emissions and inspect what
//! each sink received.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use weir_config::{ConfigError, PluginConfig};
use weir_plugin::{
    Consumer, ConsumerBase, PluginControl, Producer, ProducerBase, ProducerEvent, TypeRegistry,
    WorkerGroup,
};

/// Command the test sends to a [`TestSource`]
pub enum SourceCommand {
    /// Emit these payloads in order, then acknowledge
    Emit {
        payloads: Vec<Vec<u8>>,
        ack: oneshot::Sender<()>,
    },
}

/// Test-side handle driving a [`TestSource`]
pub struct SourceDriver {
    tx: mpsc::Sender<SourceCommand>,
}

impl SourceDriver {
    /// Emit payloads through the source and wait until they have been
    /// dispatched onto the bus
    pub async fn emit(&self, payloads: &[&str]) {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(SourceCommand::Emit {
                payloads: payloads.iter().map(|p| p.as_bytes().to_vec()).collect(),
                ack,
            })
            .await
            .expect("test source gone");
        done.await.expect("test source dropped the ack");
    }
}

/// Scriptable in-memory consumer
pub struct TestSource {
    base: ConsumerBase,
    commands: Option<mpsc::Receiver<SourceCommand>>,
}

impl TestSource {
    fn new(commands: Option<mpsc::Receiver<SourceCommand>>) -> Self {
        Self {
            base: ConsumerBase::new(),
            commands,
        }
    }
}

#[async_trait]
impl Consumer for TestSource {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)
    }

    async fn consume(&mut self, _workers: &WorkerGroup) {
        let emitter = self.base.emitter();
        let mut commands = self.commands.take();

        loop {
            tokio::select! {
                biased;

                signal = self.base.next_control() => {
                    if signal.is_stop() {
                        break;
                    }
                }
                command = async {
                    match commands.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => match command {
                    Some(SourceCommand::Emit { payloads, ack }) => {
                        for payload in payloads {
                            emitter.enqueue(&payload).await;
                        }
                        let _ = ack.send(());
                    }
                    None => commands = None,
                }
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

/// Shared record of what a sink received, in arrival order
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<String>>>);

impl Recorded {
    fn push(&self, payload: &[u8]) {
        self.0
            .lock()
            .expect("records poisoned")
            .push(String::from_utf8_lossy(payload).into_owned());
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().expect("records poisoned").clone()
    }
}

/// Recording in-memory producer
///
/// In `stall` mode the sink never reads its inbound channel while
/// running, so the channel fills to capacity; queued messages are
/// recorded during the graceful-stop drain.
pub struct TestSink {
    base: ProducerBase,
    records: Recorded,
    stall: bool,
}

impl TestSink {
    fn new(records: Recorded, stall: bool) -> Self {
        Self {
            base: ProducerBase::new(),
            records,
            stall,
        }
    }
}

#[async_trait]
impl Producer for TestSink {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)
    }

    async fn produce(&mut self, _workers: &WorkerGroup) {
        if self.stall {
            loop {
                let signal = self.base.next_control().await;
                if signal == PluginControl::StopGraceful {
                    for msg in self.base.drain() {
                        self.records.push(msg.payload());
                    }
                    break;
                }
                if signal.is_stop() {
                    break;
                }
            }
            return;
        }

        loop {
            match self.base.next_event().await {
                ProducerEvent::Message(msg) => self.records.push(msg.payload()),
                ProducerEvent::Control(PluginControl::StopGraceful) => {
                    for msg in self.base.drain() {
                        self.records.push(msg.payload());
                    }
                    break;
                }
                ProducerEvent::Control(signal) if signal.is_stop() => break,
                ProducerEvent::Control(_) => {}
            }
        }
    }

    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }
}

/// Register a scriptable source under `class`; returns its driver
pub fn register_source(registry: &mut TypeRegistry, class: &str) -> SourceDriver {
    let (tx, rx) = mpsc::channel(16);
    let slot = Arc::new(Mutex::new(Some(rx)));

    registry.register_consumer(class, move || {
        TestSource::new(slot.lock().expect("slot poisoned").take())
    });

    SourceDriver { tx }
}

/// Register a recording sink under `class`; returns its record handle
pub fn register_sink(registry: &mut TypeRegistry, class: &str) -> Recorded {
    register_sink_inner(registry, class, false)
}

/// Register a sink that never drains until stopped
pub fn register_stalling_sink(registry: &mut TypeRegistry, class: &str) -> Recorded {
    register_sink_inner(registry, class, true)
}

fn register_sink_inner(registry: &mut TypeRegistry, class: &str, stall: bool) -> Recorded {
    let records = Recorded::default();
    let handle = records.clone();

    registry.register_producer(class, move || TestSink::new(handle.clone(), stall));

    records
}

/// Producer that ignores every signal and never returns
///
/// Exercises the supervisor's hard-kill timeout: the worker must be
/// abandoned, not waited on forever.
pub struct HangingSink {
    base: ProducerBase,
}

#[async_trait]
impl Producer for HangingSink {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)
    }

    async fn produce(&mut self, _workers: &WorkerGroup) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
    }

    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }
}

/// Register a producer that never stops on its own
pub fn register_hanging_sink(registry: &mut TypeRegistry, class: &str) {
    registry.register_producer(class, || HangingSink {
        base: ProducerBase::new(),
    });
}

/// Consumer whose worker panics as soon as it starts
pub struct PanickingSource {
    base: ConsumerBase,
}

#[async_trait]
impl Consumer for PanickingSource {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)
    }

    async fn consume(&mut self, _workers: &WorkerGroup) {
        panic!("simulated adapter failure");
    }

    fn base(&self) -> &ConsumerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConsumerBase {
        &mut self.base
    }
}

/// Register a consumer that panics on start
pub fn register_panicking_source(registry: &mut TypeRegistry, class: &str) {
    registry.register_consumer(class, || PanickingSource {
        base: ConsumerBase::new(),
    });
}
