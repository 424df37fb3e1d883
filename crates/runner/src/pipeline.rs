//! Pipeline assembly and lifecycle
//!
//! `Pipeline::build` turns declarations into wired plugins and a frozen
//! bus; `start` spawns the workers; `stop` runs the two-phase shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinError;

use weir_bus::{BusBuilder, ChannelTimeout, OverflowPolicy, StreamBus};
use weir_config::{Config, PluginConfig, DROPPED_STREAM};
use weir_fuse::FuseRegistry;
use weir_message::{MessagePool, StreamId};
use weir_plugin::{
    Consumer, ControlHandle, PluginControl, PluginKind, PluginState, Producer, ShutdownRequest,
    TypeRegistry, WorkerGroup,
};

use crate::{signal, RunnerError};

/// The reserved class name for stream declarations
const STREAM_ROUTE_CLASS: &str = "stream.Route";

/// Supervisor tunables
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Hard-kill timeout per stop phase; expired waits are abandoned
    pub shutdown_timeout: Duration,

    /// Pause between stopping consumers and stopping producers, giving
    /// in-flight messages time to settle into producer channels
    pub drain_grace: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
            drain_grace: Duration::from_millis(100),
        }
    }
}

/// How to stop the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Drain pending messages before returning
    Graceful,
    /// Return at the next safe point
    Immediate,
}

impl StopMode {
    fn control(self) -> PluginControl {
        match self {
            StopMode::Graceful => PluginControl::StopGraceful,
            StopMode::Immediate => PluginControl::StopImmediate,
        }
    }
}

/// Final counters reported after shutdown
#[derive(Debug, Clone, Copy)]
pub struct PipelineSummary {
    pub dispatched: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub filtered: u64,
    pub rerouted: u64,
    pub loops_detected: u64,
    pub duration: Duration,
}

struct ConsumerEntry {
    id: String,
    plugin: Option<Box<dyn Consumer>>,
    control: ControlHandle,
    state: PluginState,
}

struct ProducerEntry {
    id: String,
    plugin: Option<Box<dyn Producer>>,
    control: ControlHandle,
    state: PluginState,
}

/// A built, wired, not-yet-started pipeline
pub struct Pipeline {
    bus: Arc<StreamBus>,
    fuses: Arc<FuseRegistry>,
    consumers: Vec<ConsumerEntry>,
    producers: Vec<ProducerEntry>,
    consumer_workers: WorkerGroup,
    producer_workers: WorkerGroup,
    shutdown: ShutdownRequest,
    shutdown_rx: Option<mpsc::Receiver<()>>,
    options: PipelineOptions,
    started_at: Instant,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("consumers", &self.consumers.len())
            .field("producers", &self.producers.len())
            .finish()
    }
}

impl Pipeline {
    /// Instantiate, configure and wire every declared plugin
    ///
    /// Fails on configuration errors: unknown class, invalid option
    /// type, transform declared at top level, reroute cycle. Unknown
    /// option keys only warn.
    pub fn build(
        config: &Config,
        registry: &TypeRegistry,
        options: PipelineOptions,
    ) -> Result<Self, RunnerError> {
        let pool = Arc::new(MessagePool::new());
        let mut builder = BusBuilder::new(pool);
        let fuses = Arc::new(FuseRegistry::new());
        let (shutdown, shutdown_rx) = ShutdownRequest::channel();

        let mut consumers: Vec<(Box<dyn Consumer>, PluginConfig)> = Vec::new();
        let mut producers: Vec<(Box<dyn Producer>, PluginConfig)> = Vec::new();
        let mut stream_configs: Vec<PluginConfig> = Vec::new();

        // Pass 1: instantiate and configure in declaration order
        for (index, decl) in config.enabled() {
            if decl.class.starts_with("stream.") {
                if decl.class != STREAM_ROUTE_CLASS {
                    return Err(RunnerError::UnknownStreamClass {
                        class: decl.class.clone(),
                    });
                }
                let mut conf = PluginConfig::new(decl, index)?;
                apply_stream_route(&mut builder, registry, &mut conf)?;
                stream_configs.push(conf);
                continue;
            }

            match registry.kind_of(&decl.class) {
                Some(PluginKind::Consumer) => {
                    let mut plugin = registry.create_consumer(&decl.class)?;
                    let mut conf = PluginConfig::new(decl, index)?;
                    plugin.configure(&mut conf)?;
                    tracing::debug!(plugin = %conf.id(), "consumer configured");
                    consumers.push((plugin, conf));
                }
                Some(PluginKind::Producer) => {
                    let mut plugin = registry.create_producer(&decl.class)?;
                    let mut conf = PluginConfig::new(decl, index)?;
                    plugin.configure(&mut conf)?;
                    tracing::debug!(plugin = %conf.id(), "producer configured");
                    producers.push((plugin, conf));
                }
                Some(kind) => {
                    return Err(RunnerError::TransformAtTopLevel {
                        class: decl.class.clone(),
                        kind,
                    });
                }
                None => {
                    // Produce the registry's own unknown-class error,
                    // complete with the list of available classes.
                    registry.create_consumer(&decl.class)?;
                    unreachable!("kind_of and create_consumer disagree");
                }
            }
        }

        // Pass 2: wire producers into the stream graph
        for (plugin, _) in &mut producers {
            let subscriber = plugin.base().subscriber();

            for name in plugin.base().stream_names().to_vec() {
                let id = builder.stream_id(&name);
                builder.subscribe(id, subscriber.clone());
            }

            // A producer-level DropToStream sets the fallback of every
            // stream it subscribes to, overriding an earlier
            // stream.Route setting for those streams.
            let drop_name = plugin.base().drop_stream_name().to_string();
            if drop_name != DROPPED_STREAM {
                let drop_id = builder.stream_id(&drop_name);
                for name in plugin.base().stream_names().to_vec() {
                    let id = builder.stream_id(&name);
                    builder.set_drop_to(id, drop_id);
                }
            }

            if let Some(fuse_name) = plugin.base().fuse_name().map(str::to_string) {
                let fuse = fuses.get(&fuse_name);

                let flag = subscriber.activity_flag();
                let control = plugin.base().control();
                fuse.on_burn(move || {
                    flag.store(false, Ordering::Release);
                    control.signal(PluginControl::FuseBurn);
                });

                let flag = subscriber.activity_flag();
                let control = plugin.base().control();
                fuse.on_activate(move || {
                    flag.store(true, Ordering::Release);
                    control.signal(PluginControl::FuseActive);
                });

                plugin.base_mut().bind_fuse(fuse);
            }
        }

        // Pass 3: intern consumer output streams, bind fuses
        let mut consumer_streams: Vec<Vec<StreamId>> = Vec::with_capacity(consumers.len());
        for (plugin, _) in &mut consumers {
            let ids: Vec<StreamId> = plugin
                .base()
                .stream_names()
                .to_vec()
                .iter()
                .map(|name| builder.stream_id(name))
                .collect();
            consumer_streams.push(ids);

            if let Some(fuse_name) = plugin.base().fuse_name().map(str::to_string) {
                let fuse = fuses.get(&fuse_name);

                let control = plugin.base().control();
                fuse.on_burn(move || {
                    control.signal(PluginControl::FuseBurn);
                });
                let control = plugin.base().control();
                fuse.on_activate(move || {
                    control.signal(PluginControl::FuseActive);
                });

                plugin.base_mut().bind_fuse(fuse);
            }
        }

        // Typos surface as warnings, never as startup failures
        for conf in stream_configs
            .iter()
            .chain(consumers.iter().map(|(_, conf)| conf))
            .chain(producers.iter().map(|(_, conf)| conf))
        {
            for key in conf.unused_keys() {
                tracing::warn!(plugin = %conf.id(), option = %key, "unknown option ignored");
            }
        }

        // Freeze: validates the reroute graph, then routing is
        // lock-free for the pipeline lifetime
        let bus = builder.freeze()?;

        let consumer_entries = consumers
            .into_iter()
            .zip(consumer_streams)
            .map(|((mut plugin, conf), streams)| {
                plugin
                    .base_mut()
                    .bind(Arc::clone(&bus), streams, shutdown.clone());
                ConsumerEntry {
                    id: conf.id().to_string(),
                    control: plugin.base().control(),
                    plugin: Some(plugin),
                    state: PluginState::Initializing,
                }
            })
            .collect();

        let producer_entries = producers
            .into_iter()
            .map(|(plugin, conf)| ProducerEntry {
                id: conf.id().to_string(),
                control: plugin.base().control(),
                plugin: Some(plugin),
                state: PluginState::Initializing,
            })
            .collect();

        Ok(Self {
            bus,
            fuses,
            consumers: consumer_entries,
            producers: producer_entries,
            consumer_workers: WorkerGroup::new(),
            producer_workers: WorkerGroup::new(),
            shutdown,
            shutdown_rx: Some(shutdown_rx),
            options,
            started_at: Instant::now(),
        })
    }

    /// The frozen stream bus (metrics access for diagnostics)
    pub fn bus(&self) -> &Arc<StreamBus> {
        &self.bus
    }

    /// The fuse registry shared by all plugins
    pub fn fuses(&self) -> &Arc<FuseRegistry> {
        &self.fuses
    }

    /// Handle plugins and embedders use to request a graceful stop
    pub fn shutdown_handle(&self) -> ShutdownRequest {
        self.shutdown.clone()
    }

    /// Lifecycle state of every plugin instance, for diagnostics
    pub fn plugin_states(&self) -> Vec<(String, PluginState)> {
        self.consumers
            .iter()
            .map(|entry| (entry.id.clone(), entry.state))
            .chain(
                self.producers
                    .iter()
                    .map(|entry| (entry.id.clone(), entry.state)),
            )
            .collect()
    }

    /// Control handles of every plugin, consumers first
    pub fn control_handles(&self) -> Vec<ControlHandle> {
        self.consumers
            .iter()
            .map(|entry| entry.control.clone())
            .chain(self.producers.iter().map(|entry| entry.control.clone()))
            .collect()
    }

    /// Spawn all plugin workers: producers first, then consumers
    ///
    /// Each worker runs behind a panic boundary: a panicking producer
    /// is logged and its channel closes (upstream traffic follows the
    /// drop policy); a panicking consumer additionally triggers daemon
    /// shutdown.
    pub fn start(&mut self) {
        self.started_at = Instant::now();

        for entry in &mut self.producers {
            let mut plugin = entry.plugin.take().expect("pipeline started twice");
            let workers = self.producer_workers.clone();
            let id = entry.id.clone();

            let handle = self
                .producer_workers
                .spawn(async move { plugin.produce(&workers).await });

            let watcher_id = entry.id.clone();
            tokio::spawn(async move {
                if let Err(err) = handle.await {
                    report_worker_panic("producer", &watcher_id, err);
                }
            });

            entry.state = PluginState::Active;
            tracing::info!(plugin = %id, "producer started");
        }

        for entry in &mut self.consumers {
            let mut plugin = entry.plugin.take().expect("pipeline started twice");
            let workers = self.consumer_workers.clone();
            let id = entry.id.clone();

            let handle = self
                .consumer_workers
                .spawn(async move { plugin.consume(&workers).await });

            let watcher_id = entry.id.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                if let Err(err) = handle.await {
                    report_worker_panic("consumer", &watcher_id, err);
                    shutdown.request();
                }
            });

            entry.state = PluginState::Active;
            tracing::info!(plugin = %id, "consumer started");
        }

        tracing::info!(
            consumers = self.consumers.len(),
            producers = self.producers.len(),
            streams = self.bus.stream_count(),
            "pipeline started"
        );
    }

    /// Two-phase stop: consumers, drain grace, producers
    ///
    /// Both waits are bounded by the hard-kill timeout; an expired wait
    /// is abandoned with a warning rather than blocking shutdown.
    pub async fn stop(mut self, mode: StopMode) -> PipelineSummary {
        let timeout = self.options.shutdown_timeout;

        tracing::info!(mode = ?mode, "stopping consumers");
        for entry in &mut self.consumers {
            entry.state = PluginState::Stopping;
            entry.control.signal(mode.control());
        }
        self.consumer_workers.close();
        if tokio::time::timeout(timeout, self.consumer_workers.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.consumer_workers.len(),
                "consumers did not stop within timeout, abandoning"
            );
        }
        for entry in &mut self.consumers {
            entry.state = PluginState::Dead;
        }

        tokio::time::sleep(self.options.drain_grace).await;

        tracing::info!(mode = ?mode, "stopping producers");
        for entry in &mut self.producers {
            entry.state = PluginState::Stopping;
            entry.control.signal(mode.control());
        }
        self.producer_workers.close();
        if tokio::time::timeout(timeout, self.producer_workers.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.producer_workers.len(),
                "producers did not stop within timeout, abandoning"
            );
        }
        for entry in &mut self.producers {
            entry.state = PluginState::Dead;
        }

        let snapshot = self.bus.metrics().snapshot();
        let summary = PipelineSummary {
            dispatched: snapshot.dispatched,
            delivered: snapshot.delivered,
            dropped: snapshot.dropped,
            filtered: snapshot.filtered,
            rerouted: snapshot.rerouted,
            loops_detected: snapshot.loops_detected,
            duration: self.started_at.elapsed(),
        };

        tracing::info!(
            dispatched = summary.dispatched,
            delivered = summary.delivered,
            dropped = summary.dropped,
            filtered = summary.filtered,
            rerouted = summary.rerouted,
            loops_detected = summary.loops_detected,
            "pipeline stopped"
        );

        summary
    }

    /// Start, run until a shutdown trigger, stop gracefully
    ///
    /// Triggers: SIGINT/SIGTERM, or a plugin's shutdown request. A
    /// second signal during shutdown escalates to an immediate stop.
    /// SIGHUP is forwarded to every plugin as `Roll` while running.
    pub async fn run(mut self) -> PipelineSummary {
        self.start();

        let roll_task = signal::spawn_sighup_roll(self.control_handles());

        let mut shutdown_rx = self.shutdown_rx.take();
        tokio::select! {
            _ = signal::shutdown_signal() => {
                tracing::info!("shutdown signal received");
            }
            _ = async {
                match shutdown_rx.as_mut() {
                    Some(rx) => { rx.recv().await; }
                    None => std::future::pending().await,
                }
            } => {
                tracing::info!("shutdown requested from inside the pipeline");
            }
        }

        if let Some(task) = roll_task {
            task.abort();
        }

        // A second signal during the drain escalates to immediate stop
        let controls = self.control_handles();
        let escalate = tokio::spawn(async move {
            signal::shutdown_signal().await;
            tracing::warn!("second shutdown signal, stopping immediately");
            for control in &controls {
                control.signal(PluginControl::StopImmediate);
            }
        });

        let summary = self.stop(StopMode::Graceful).await;
        escalate.abort();
        summary
    }
}

/// Attach chains and attributes from one `stream.Route` declaration
fn apply_stream_route(
    builder: &mut BusBuilder,
    registry: &TypeRegistry,
    conf: &mut PluginConfig,
) -> Result<(), RunnerError> {
    let names = conf.stream_names()?;
    let filter_classes = conf.get_string_list("Filter", &[])?;
    let formatter_classes = conf.get_string_list("Formatter", &[])?;
    let policy = OverflowPolicy::parse(&conf.get_string("OverflowPolicy", "block")?, conf.id())?;
    let timeout = ChannelTimeout::from_millis(conf.get_int("TimeoutMs", 0)?);
    let drop_name = conf.drop_stream()?;

    for name in &names {
        let id = builder.stream_id(name);

        for class in &filter_classes {
            let mut filter = registry.create_filter(class)?;
            filter.configure(conf)?;
            builder.add_filter(id, filter);
        }
        for class in &formatter_classes {
            let mut formatter = registry.create_formatter(class)?;
            formatter.configure(conf)?;
            builder.add_formatter(id, formatter);
        }

        builder.set_policy(id, policy);
        builder.set_timeout(id, timeout);
        let drop_id = builder.stream_id(&drop_name);
        builder.set_drop_to(id, drop_id);

        tracing::debug!(
            stream = %name,
            filters = filter_classes.len(),
            formatters = formatter_classes.len(),
            policy = ?policy,
            "stream configured"
        );
    }

    Ok(())
}

fn report_worker_panic(kind: &str, plugin: &str, err: JoinError) {
    if !err.is_panic() {
        return;
    }

    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::error!(
        plugin = %plugin,
        kind = %kind,
        panic = %message,
        "worker panicked"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = PipelineOptions::default();
        assert_eq!(options.shutdown_timeout, Duration::from_secs(10));
        assert!(options.drain_grace < options.shutdown_timeout);
    }

    #[test]
    fn test_build_empty_config() {
        let config = Config::default();
        let registry = TypeRegistry::new();
        let pipeline = Pipeline::build(&config, &registry, PipelineOptions::default()).unwrap();

        assert!(pipeline.consumers.is_empty());
        assert!(pipeline.producers.is_empty());
        // The two reserved streams always exist
        assert_eq!(pipeline.bus().stream_count(), 2);
    }

    #[test]
    fn test_unknown_class_is_fatal() {
        let config = Config::from_str("- \"consumer.Missing\": {}\n").unwrap();
        let registry = TypeRegistry::new();
        let err = Pipeline::build(&config, &registry, PipelineOptions::default()).unwrap_err();
        assert!(err.to_string().contains("consumer.Missing"));
    }

    #[test]
    fn test_unknown_stream_class_is_fatal() {
        let config = Config::from_str("- \"stream.Broadcast\": {}\n").unwrap();
        let registry = TypeRegistry::new();
        let err = Pipeline::build(&config, &registry, PipelineOptions::default()).unwrap_err();
        assert!(matches!(err, RunnerError::UnknownStreamClass { .. }));
    }
}
