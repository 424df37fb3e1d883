//! Console consumer - reads stdin
//!
//! Every line read from stdin becomes one message on the bound streams.
//! With `ExitOnEOF: true` the daemon shuts down gracefully once stdin
//! closes, which makes `cat file | weir` a one-shot replay.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use weir_config::{ConfigError, PluginConfig};
use weir_plugin::{Consumer, ConsumerBase, WorkerGroup};

/// Consumer reading newline-delimited messages from stdin
///
/// Configuration:
///
/// ```yaml
/// - "consumer.Console":
///     Stream: ["ingest"]
///     ExitOnEOF: true
/// ```
pub struct ConsoleConsumer {
    base: ConsumerBase,
    exit_on_eof: bool,
}

impl ConsoleConsumer {
    /// Create an unconfigured instance
    pub fn new() -> Self {
        Self {
            base: ConsumerBase::new(),
            exit_on_eof: false,
        }
    }
}

impl Default for ConsoleConsumer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Consumer for ConsoleConsumer {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)?;
        self.exit_on_eof = conf.get_bool("ExitOnEOF", false)?;
        Ok(())
    }

    async fn consume(&mut self, _workers: &WorkerGroup) {
        let emitter = self.base.emitter();
        let shutdown = self.base.shutdown_handle();
        let id = self.base.id().to_string();
        let exit_on_eof = self.exit_on_eof;

        // A blocked stdin read cannot be cancelled, so the reader runs
        // detached instead of holding up the shutdown barrier.
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => emitter.enqueue(line.as_bytes()).await,
                    Ok(None) => {
                        tracing::info!(consumer = %id, "stdin closed");
                        if exit_on_eof {
                            if let Some(shutdown) = shutdown {
                                shutdown.request();
                            }
                        }
                        break;
                    }
                    Err(err) => {
                        tracing::error!(consumer = %id, error = %err, "stdin read failed");
                        break;
                    }
                }
            }
        });

        loop {
            if self.base.next_control().await.is_stop() {
                break;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_defaults() {
        let config = weir_config::Config::from_str("- \"consumer.Console\": {}\n").unwrap();
        let mut conf = PluginConfig::new(&config.plugins[0], 0).unwrap();

        let mut consumer = ConsoleConsumer::new();
        consumer.configure(&mut conf).unwrap();

        assert!(!consumer.exit_on_eof);
        assert_eq!(consumer.base().stream_names(), ["*"]);
        assert!(conf.unused_keys().is_empty());
    }
}
