//! File producer - appends to a log file
//!
//! Appends each payload (newline-terminated) to `File`. On `Roll`
//! (broadcast on SIGHUP) the current file is renamed with a timestamp
//! suffix and a fresh one is opened. A write failure burns the bound
//! fuse; the registered health check re-opens the path until it
//! succeeds, at which point the fuse re-activates and writing resumes.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use weir_config::{ConfigError, PluginConfig};
use weir_message::Message;
use weir_plugin::{PluginControl, Producer, ProducerBase, ProducerEvent, WorkerGroup};

/// Producer appending messages to a file
///
/// Configuration:
///
/// ```yaml
/// - "producer.File":
///     Stream: ["ingest"]
///     File: "/var/log/weir/ingest.log"
///     Fuse: "disk"
/// ```
pub struct FileProducer {
    base: ProducerBase,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileProducer {
    /// Create an unconfigured instance
    pub fn new() -> Self {
        Self {
            base: ProducerBase::new(),
            path: PathBuf::new(),
            writer: None,
        }
    }

    /// The configured file path
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn open(&mut self) -> bool {
        match OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await
        {
            Ok(file) => {
                self.writer = Some(BufWriter::new(file));
                true
            }
            Err(err) => {
                tracing::error!(
                    producer = %self.base.id(),
                    file = %self.path.display(),
                    error = %err,
                    "failed to open file"
                );
                self.writer = None;
                false
            }
        }
    }

    async fn write(&mut self, msg: Message) {
        if self.writer.is_none() && !self.open().await {
            self.base.burn_fuse();
            return;
        }

        let payload = msg.payload();
        let writer = self.writer.as_mut().expect("writer opened above");
        let result = async {
            writer.write_all(payload).await?;
            if payload.last() != Some(&b'\n') {
                writer.write_all(b"\n").await?;
            }
            writer.flush().await
        }
        .await;

        if let Err(err) = result {
            tracing::error!(
                producer = %self.base.id(),
                file = %self.path.display(),
                error = %err,
                "write failed"
            );
            self.writer = None;
            self.base.burn_fuse();
        }
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush().await {
                tracing::warn!(producer = %self.base.id(), error = %err, "flush on close failed");
            }
        }
    }

    /// Rotate: rename the current file with a timestamp suffix and
    /// start a fresh one
    async fn rotate(&mut self) {
        self.close().await;

        let rotated = {
            let stamp = Utc::now().format("%Y%m%d_%H%M%S");
            let mut name = self.path.as_os_str().to_owned();
            name.push(format!(".{stamp}"));
            PathBuf::from(name)
        };

        match tokio::fs::rename(&self.path, &rotated).await {
            Ok(()) => {
                tracing::info!(
                    producer = %self.base.id(),
                    from = %self.path.display(),
                    to = %rotated.display(),
                    "file rotated"
                );
            }
            Err(err) => {
                tracing::warn!(
                    producer = %self.base.id(),
                    file = %self.path.display(),
                    error = %err,
                    "rotate rename failed, continuing with current file"
                );
            }
        }

        self.open().await;
    }
}

impl Default for FileProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for FileProducer {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.base.configure(conf)?;
        let plugin = conf.id().to_string();
        let path = conf.get_string("File", "")?;
        if path.is_empty() {
            return Err(ConfigError::invalid_value(plugin, "File", "must be set"));
        }
        self.path = PathBuf::from(path);
        Ok(())
    }

    async fn produce(&mut self, _workers: &WorkerGroup) {
        // The health check for the bound fuse probes the same path the
        // writer uses.
        if let Some(fuse) = self.base.fuse() {
            let path = self.path.clone();
            fuse.register_check(move || {
                std::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&path)
                    .is_ok()
            });
        }

        if !self.open().await {
            self.base.burn_fuse();
        }

        loop {
            match self.base.next_event().await {
                ProducerEvent::Message(msg) => self.write(msg).await,
                ProducerEvent::Control(PluginControl::StopGraceful) => {
                    for msg in self.base.drain() {
                        self.write(msg).await;
                    }
                    self.close().await;
                    break;
                }
                ProducerEvent::Control(PluginControl::StopImmediate) => {
                    self.close().await;
                    break;
                }
                ProducerEvent::Control(PluginControl::Roll) => self.rotate().await,
                ProducerEvent::Control(PluginControl::FuseBurn) => self.close().await,
                ProducerEvent::Control(PluginControl::FuseActive) => {
                    self.open().await;
                }
            }
        }

        tracing::info!(
            producer = %self.base.id(),
            file = %self.path.display(),
            "file producer finished"
        );
    }

    fn base(&self) -> &ProducerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProducerBase {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weir_message::{MessagePool, StreamId};

    fn configured(path: &str) -> FileProducer {
        let yaml = format!("- \"producer.File\":\n    File: \"{path}\"\n    Channel: 16\n");
        let config = weir_config::Config::from_str(&yaml).unwrap();
        let mut conf = PluginConfig::new(&config.plugins[0], 0).unwrap();
        let mut producer = FileProducer::new();
        producer.configure(&mut conf).unwrap();
        producer
    }

    #[test]
    fn test_missing_file_option_fails() {
        let config = weir_config::Config::from_str("- \"producer.File\": {}\n").unwrap();
        let mut conf = PluginConfig::new(&config.plugins[0], 0).unwrap();
        assert!(FileProducer::new().configure(&mut conf).is_err());
    }

    #[tokio::test]
    async fn test_writes_lines_and_drains_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut producer = configured(path.to_str().unwrap());

        let subscriber = producer.base().subscriber();
        let control = producer.base().control();
        let pool = Arc::new(MessagePool::new());

        for payload in [b"one" as &[u8], b"two", b"three"] {
            let _ = subscriber.try_send(Message::new(&pool, payload, StreamId::new(2), 0));
        }
        control.signal(PluginControl::StopGraceful);

        producer.produce(&WorkerGroup::new()).await;

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn test_rotate_moves_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotate.log");
        let mut producer = configured(path.to_str().unwrap());

        let subscriber = producer.base().subscriber();
        let control = producer.base().control();
        let pool = Arc::new(MessagePool::new());

        let _ = subscriber.try_send(Message::new(&pool, b"before", StreamId::new(2), 0));
        control.signal(PluginControl::Roll);
        control.signal(PluginControl::StopGraceful);

        producer.produce(&WorkerGroup::new()).await;

        let rotated: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("rotate.log."))
            .collect();
        assert_eq!(rotated.len(), 1, "expected one rotated file: {rotated:?}");
    }
}
