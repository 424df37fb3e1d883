//! OS signal plumbing
//!
//! Translates process signals into the control-channel signal set:
//! SIGINT/SIGTERM request a graceful stop, a second one escalates to
//! immediate, SIGHUP broadcasts `Roll` to every plugin.

use tokio::task::JoinHandle;

use weir_plugin::{ControlHandle, PluginControl};

/// Resolve when a shutdown signal (SIGINT or SIGTERM) arrives
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending().await
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            std::future::pending().await
        }
    };

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
}

/// Resolve when Ctrl-C arrives
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

/// Forward SIGHUP to every plugin as a `Roll` signal
///
/// Returns the forwarder task so the caller can abort it at shutdown;
/// `None` on platforms without SIGHUP.
pub fn spawn_sighup_roll(controls: Vec<ControlHandle>) -> Option<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGHUP handler");
                return None;
            }
        };

        Some(tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                tracing::info!(plugins = controls.len(), "SIGHUP: broadcasting roll");
                for control in &controls {
                    control.signal(PluginControl::Roll);
                }
            }
        }))
    }

    #[cfg(not(unix))]
    {
        let _ = controls;
        None
    }
}
