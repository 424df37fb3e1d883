//! Weir - Plugin
//!
//! The plugin model: adapter-facing traits, the type registry, the
//! control-loop contract, and the base state composed into every
//! consumer and producer.
//!
//! # Plugin kinds
//!
//! - **Consumer** (ingress): owns I/O workers, builds messages, and
//!   enqueues them onto its bound streams through an [`Emitter`].
//! - **Producer** (egress): drains its bounded inbound channel and
//!   writes to a backend.
//! - **Filter / Formatter** (transform): synchronous per-stream hooks,
//!   declared on `stream.Route` declarations (traits live in
//!   `weir-bus`, factories in the registry here).
//!
//! # Lifecycle
//!
//! Every consumer and producer owns a small control channel carrying
//! [`PluginControl`] signals. Adapters run an explicit control loop:
//!
//! ```ignore
//! async fn consume(&mut self, workers: &WorkerGroup) {
//!     let emitter = self.base().emitter();
//!     workers.spawn(read_socket(emitter));
//!
//!     loop {
//!         match self.base_mut().next_control().await {
//!             PluginControl::StopGraceful | PluginControl::StopImmediate => break,
//!             PluginControl::Roll => self.reopen().await,
//!             PluginControl::FuseBurn => self.pause(),
//!             PluginControl::FuseActive => self.resume(),
//!         }
//!     }
//! }
//! ```
//!
//! The supervisor stops consumers first (phase one) and producers after
//! a drain grace period (phase two); on `StopGraceful` producers drain
//! their inbound channel before returning.

mod consumer;
mod control;
mod producer;
mod registry;
mod worker;

pub use consumer::{ConsumerBase, Emitter};
pub use control::{
    ControlHandle, PluginControl, PluginState, ShutdownRequest, CONTROL_CHANNEL_CAPACITY,
};
pub use producer::{ProducerBase, ProducerEvent};
pub use registry::{PluginKind, RegistryError, TypeRegistry};
pub use worker::WorkerGroup;

use async_trait::async_trait;
use weir_config::{ConfigError, PluginConfig};

/// Trait implemented by ingress adapters
///
/// `configure` runs once at startup, before any worker exists; errors
/// abort the daemon. `consume` is called once on the plugin's own
/// worker: it starts I/O tasks on the worker group and then blocks in
/// the control loop until stopped.
#[async_trait]
pub trait Consumer: Send {
    /// Consume recognized options; called exactly once before start
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError>;

    /// Run until a stop signal arrives
    async fn consume(&mut self, workers: &WorkerGroup);

    /// Shared consumer state
    fn base(&self) -> &ConsumerBase;

    /// Shared consumer state, mutable
    fn base_mut(&mut self) -> &mut ConsumerBase;
}

impl std::fmt::Debug for dyn Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer").field("id", &self.base().id()).finish()
    }
}

/// Trait implemented by egress adapters
///
/// `produce` is called once on the plugin's own worker: it loops over
/// [`ProducerBase::next_event`], writing messages to its backend. On
/// `StopGraceful` it must drain pending messages before returning; on
/// `StopImmediate` it returns at the next safe point.
#[async_trait]
pub trait Producer: Send {
    /// Consume recognized options; called exactly once before start
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError>;

    /// Run until a stop signal arrives
    async fn produce(&mut self, workers: &WorkerGroup);

    /// Shared producer state
    fn base(&self) -> &ProducerBase;

    /// Shared producer state, mutable
    fn base_mut(&mut self) -> &mut ProducerBase;
}
