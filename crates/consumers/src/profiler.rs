//! Profiler consumer - synthetic load generator
//!
//! Emits `Runs` messages per batch for `Batches` batches, each payload
//! being `<n>/<runs> <random text>` of roughly `Length` characters, and
//! logs the achieved message rate per batch. The daemon shuts down
//! after the last batch unless `ExitOnFinish: false`.

use std::time::Instant;

use async_trait::async_trait;
use rand::Rng;

use weir_config::{ConfigError, PluginConfig};
use weir_plugin::{Consumer, ConsumerBase, WorkerGroup};

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 _.!?/&%$'";

/// Consumer generating synthetic traffic for pipeline profiling
///
/// Configuration:
///
/// ```yaml
/// - "consumer.Profiler":
///     Stream: ["profile"]
///     Runs: 10000
///     Batches: 10
///     Length: 256
/// ```
pub struct ProfilerConsumer {
    base: ConsumerBase,
    runs: usize,
    batches: usize,
    length: usize,
    exit_on_finish: bool,
}

impl ProfilerConsumer {
    /// Create an unconfigured instance
    pub fn new() -> Self {
        Self {
            base: ConsumerBase::new(),
            runs: 10_000,
            batches: 10,
            length: 256,
            exit_on_finish: true,
        }
    }
}

impl Default for ProfilerConsumer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Consumer for ProfilerConsumer {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)?;
        self.runs = conf.get_usize("Runs", 10_000)?;
        self.batches = conf.get_usize("Batches", 10)?;
        self.length = conf.get_usize("Length", 256)?;
        self.exit_on_finish = conf.get_bool("ExitOnFinish", true)?;
        Ok(())
    }

    async fn consume(&mut self, workers: &WorkerGroup) {
        let emitter = self.base.emitter();
        let shutdown = self.base.shutdown_handle();
        let id = self.base.id().to_string();
        let (runs, batches, length) = (self.runs, self.batches, self.length);
        let exit_on_finish = self.exit_on_finish;

        workers.spawn(async move {
            let filler: String = {
                let mut rng = rand::thread_rng();
                (0..length)
                    .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
                    .collect()
            };

            for batch in 0..batches {
                let start = Instant::now();
                for run in 0..runs {
                    let payload = format!("{}/{} {}", run, runs, filler);
                    emitter.enqueue(payload.as_bytes()).await;
                }
                let elapsed = start.elapsed().as_secs_f64();

                tracing::info!(
                    consumer = %id,
                    batch,
                    seconds = format_args!("{:.4}", elapsed),
                    rate = format_args!("{:.0} msg/sec", runs as f64 / elapsed.max(f64::EPSILON)),
                    "profile batch finished"
                );
            }

            if exit_on_finish {
                if let Some(shutdown) = shutdown {
                    shutdown.request();
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
