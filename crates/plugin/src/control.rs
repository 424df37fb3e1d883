//! Control signals and plugin state
//!
//! The control channel is the sole cancellation path: lifecycle and
//! fuse events arrive as tagged signals, dispatched by each plugin's
//! control loop.

use std::sync::Arc;

use tokio::sync::mpsc;

/// Capacity of each plugin's control channel
///
/// Signals are rare (stop, roll, fuse transitions); a small bound keeps
/// a stuck plugin from hiding an unbounded signal backlog.
pub const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// Signals carried on a plugin's control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginControl {
    /// Stop after draining pending work
    StopGraceful,
    /// Stop at the next safe point without draining
    StopImmediate,
    /// Rotate logs / reopen backends (broadcast on SIGHUP)
    Roll,
    /// The bound fuse burned; release external resources
    FuseBurn,
    /// The bound fuse re-activated; re-acquire resources
    FuseActive,
}

impl PluginControl {
    /// Whether this signal ends the control loop
    #[inline]
    pub fn is_stop(self) -> bool {
        matches!(self, PluginControl::StopGraceful | PluginControl::StopImmediate)
    }
}

/// Lifecycle state of a plugin instance, tracked by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluginState {
    /// Created, not yet started
    #[default]
    Initializing,
    /// Worker running
    Active,
    /// Stop signal sent, worker not yet joined
    Stopping,
    /// Worker finished or abandoned
    Dead,
}

/// Sending half of a plugin's control channel
///
/// Clonable; held by the supervisor and by fuse callbacks.
#[derive(Clone)]
pub struct ControlHandle {
    plugin: Arc<str>,
    sender: mpsc::Sender<PluginControl>,
}

impl ControlHandle {
    pub(crate) fn new(plugin: Arc<str>, sender: mpsc::Sender<PluginControl>) -> Self {
        Self { plugin, sender }
    }

    /// Plugin instance this handle signals
    #[inline]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Post a signal without blocking
    ///
    /// Returns false if the plugin is gone or its control channel is
    /// saturated; a lost signal is logged, never fatal.
    pub fn signal(&self, signal: PluginControl) -> bool {
        match self.sender.try_send(signal) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    plugin = %self.plugin,
                    signal = ?signal,
                    "control signal not delivered: {}",
                    match err {
                        mpsc::error::TrySendError::Full(_) => "channel full",
                        mpsc::error::TrySendError::Closed(_) => "plugin stopped",
                    }
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("plugin", &self.plugin)
            .finish()
    }
}

/// Handle for requesting daemon shutdown from inside a plugin
///
/// Used by consumers that finish their input (generators, replays) and
/// by the supervisor's panic boundary.
#[derive(Clone)]
pub struct ShutdownRequest {
    sender: mpsc::Sender<()>,
}

impl ShutdownRequest {
    /// Create the request handle and the receiving half the supervisor
    /// waits on
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (sender, receiver) = mpsc::channel(1);
        (Self { sender }, receiver)
    }

    /// Ask the supervisor to begin a graceful stop
    ///
    /// Idempotent; requests after the first are ignored.
    pub fn request(&self) {
        let _ = self.sender.try_send(());
    }
}
