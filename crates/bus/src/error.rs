//! Bus error types

use thiserror::Error;

/// Errors raised while assembling the stream graph
///
/// All of these are configuration errors: they are reported before any
/// worker starts and abort the daemon.
#[derive(Debug, Error)]
pub enum BusError {
    /// `DropToStream` chains form a cycle
    ///
    /// A rerouted message would bounce between these streams forever;
    /// detected statically at freeze time.
    #[error("DropToStream cycle: {path}")]
    RerouteCycle {
        /// The streams on the cycle, arrow separated
        path: String,
    },
}
