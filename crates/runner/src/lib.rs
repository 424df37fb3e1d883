//! Weir - Runner
//!
//! The pipeline supervisor. Takes a parsed configuration and a type
//! registry, instantiates and wires every plugin, freezes the stream
//! bus, starts the workers, and drives the orderly two-phase shutdown.
//!
//! # Startup sequence
//!
//! 1. Walk the declarations in file order. `stream.Route` declarations
//!    configure streams (chains, policy, timeout, fallback); everything
//!    else resolves through the registry and gets `configure`d.
//! 2. Subscribe each producer to its streams, intern each consumer's
//!    output streams, bind fuses.
//! 3. Warn about declared-but-unconsumed options; fail on
//!    `DropToStream` cycles.
//! 4. Freeze the bus - subscription lists are immutable from here on.
//! 5. Start producers first, then consumers, each on its own worker
//!    with a panic boundary.
//!
//! # Shutdown
//!
//! Triggered by signal, by a plugin's shutdown request, or by a
//! consumer panic. Phase one stops every consumer (no more ingress),
//! then after a drain grace period phase two stops every producer;
//! both waits are bounded by the hard-kill timeout, after which the
//! remaining workers are abandoned with a warning. A final summary of
//! routed/dropped counts is logged and returned.

mod error;
mod pipeline;
pub mod signal;

pub use error::RunnerError;
pub use pipeline::{Pipeline, PipelineOptions, PipelineSummary, StopMode};
