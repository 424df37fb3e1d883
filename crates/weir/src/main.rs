//! Weir - stream-addressed log and event routing daemon
//!
//! # Usage
//!
//! ```bash
//! # Run a pipeline
//! weir --config weir.yaml
//!
//! # Check a configuration without starting workers
//! weir --config weir.yaml --validate
//!
//! # Verbose routing diagnostics
//! weir --config weir.yaml --log-level debug
//! ```
//!
//! SIGINT/SIGTERM stop the pipeline gracefully (a second signal stops
//! it immediately); SIGHUP broadcasts a roll signal so file producers
//! rotate their outputs.

mod registry;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weir_config::Config;
use weir_runner::{Pipeline, PipelineOptions};

/// Stream-addressed log and event routing daemon
#[derive(Parser, Debug)]
#[command(name = "weir")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML pipeline configuration
    #[arg(short, long, default_value = "weir.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error) or filter directive
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit without starting workers
    #[arg(long)]
    validate: bool,

    /// Hard-kill timeout per shutdown phase, in seconds
    #[arg(long, default_value_t = 10)]
    shutdown_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("weir: {err}");
        std::process::exit(1);
    }

    // A configuration error aborts before any plugin starts; exit
    // non-zero so init systems notice.
    if let Err(err) = run(cli).await {
        tracing::error!(error = format_args!("{err:#}"), "weir failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "weir starting"
    );

    let config = Config::from_file(&cli.config).context("failed to load configuration")?;
    let registry = registry::builtin_registry();

    let options = PipelineOptions {
        shutdown_timeout: Duration::from_secs(cli.shutdown_timeout_secs),
        ..Default::default()
    };

    let pipeline =
        Pipeline::build(&config, &registry, options).context("failed to build pipeline")?;

    if cli.validate {
        tracing::info!(
            plugins = config.plugins.len(),
            streams = pipeline.bus().stream_count(),
            "configuration valid"
        );
        return Ok(());
    }

    let summary = pipeline.run().await;

    tracing::info!(
        dispatched = summary.dispatched,
        delivered = summary.delivered,
        dropped = summary.dropped,
        seconds = summary.duration.as_secs(),
        "weir shutdown complete"
    );
    Ok(())
}

/// Initialize the tracing subscriber
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| anyhow::anyhow!("invalid log level: {err}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}
