//! Minimal shipper: fans replayed messages out to stdout and file/FIFO sinks.
//!
//! Each message is written as its raw line followed by `\n` and flushed
//! immediately so the replay cadence is visible downstream. A sink that
//! fails is dropped with a warning; the shipper fails once no sink is left.

use std::path::PathBuf;

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ironpost_core::config::OutputConfig;
use ironpost_core::types::Message;

use crate::error::CliError;

/// Where a sink writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Process stdout.
    Stdout,
    /// Regular file (appended) or FIFO.
    File(PathBuf),
}

impl std::fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Resolve the enabled sinks.
///
/// Stdout is enabled by `[output].stdout` or `--stdout`. Configured files are
/// only used with `--play-outputs-enable`. No enabled sink is a config error.
pub fn plan_targets(
    output: &OutputConfig,
    stdout: bool,
    play_outputs_enable: bool,
) -> Result<Vec<SinkTarget>, CliError> {
    let mut targets = Vec::new();
    if output.stdout || stdout {
        targets.push(SinkTarget::Stdout);
    }
    if play_outputs_enable {
        targets.extend(
            output
                .files
                .iter()
                .filter(|f| !f.trim().is_empty())
                .map(|f| SinkTarget::File(PathBuf::from(f.trim()))),
        );
    } else if !output.files.is_empty() {
        info!(
            files = output.files.len(),
            "file outputs configured but --play-outputs-enable not set, ignoring"
        );
    }

    if targets.is_empty() {
        return Err(CliError::Config("no outputs configured".to_owned()));
    }
    Ok(targets)
}

struct Sink {
    name: String,
    writer: BufWriter<Box<dyn AsyncWrite + Unpin + Send>>,
}

/// Delivery summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShipReport {
    /// Messages written to at least one sink.
    pub delivered: u64,
    /// Sinks dropped after a write failure.
    pub failed_sinks: usize,
}

/// Fan-out writer over all enabled sinks.
pub struct Shipper {
    sinks: Vec<Sink>,
}

impl Shipper {
    /// Open every target. Files are created if missing and appended to.
    pub async fn open(targets: &[SinkTarget]) -> Result<Self, CliError> {
        let mut shipper = Self { sinks: Vec::new() };
        for target in targets {
            let writer: Box<dyn AsyncWrite + Unpin + Send> = match target {
                SinkTarget::Stdout => Box::new(tokio::io::stdout()),
                SinkTarget::File(path) => Box::new(
                    tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .await?,
                ),
            };
            debug!(sink = %target, "output sink opened");
            shipper = shipper.with_writer(target.to_string(), writer);
        }
        Ok(shipper)
    }

    /// Add an arbitrary writer as a sink.
    pub fn with_writer(
        mut self,
        name: impl Into<String>,
        writer: Box<dyn AsyncWrite + Unpin + Send>,
    ) -> Self {
        self.sinks.push(Sink {
            name: name.into(),
            writer: BufWriter::new(writer),
        });
        self
    }

    /// Number of live sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Consume the merged replay channel until it closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Message>) -> Result<ShipReport, CliError> {
        let mut report = ShipReport::default();

        while let Some(message) = rx.recv().await {
            let mut delivered = false;
            let mut index = 0;
            while index < self.sinks.len() {
                let sink = &mut self.sinks[index];
                match write_line(&mut sink.writer, &message.data).await {
                    Ok(()) => {
                        delivered = true;
                        index += 1;
                    }
                    Err(e) => {
                        warn!(sink = %sink.name, error = %e, "output sink failed, dropping it");
                        self.sinks.remove(index);
                        report.failed_sinks += 1;
                    }
                }
            }

            if self.sinks.is_empty() {
                return Err(CliError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "all output sinks failed",
                )));
            }
            if delivered {
                report.delivered += 1;
            }
        }

        for sink in &mut self.sinks {
            if let Err(e) = sink.writer.shutdown().await {
                debug!(sink = %sink.name, error = %e, "output sink shutdown failed");
            }
        }
        Ok(report)
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(data).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(text: &str) -> Message {
        Message {
            data: text.as_bytes().to_vec().into(),
            source: "/data/a.json".to_owned(),
            offset: 0,
            time: Utc::now(),
            key: "syslog".to_owned(),
        }
    }

    #[test]
    fn test_plan_requires_an_output() {
        let output = OutputConfig::default();
        let err = plan_targets(&output, false, false).expect_err("no outputs");
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("no outputs configured"));
    }

    #[test]
    fn test_plan_files_need_play_outputs_enable() {
        let output = OutputConfig {
            stdout: false,
            files: vec!["/tmp/replay.fifo".to_owned()],
        };
        assert!(plan_targets(&output, false, false).is_err());
        let targets = plan_targets(&output, false, true).expect("file output enabled");
        assert_eq!(targets, vec![SinkTarget::File(PathBuf::from("/tmp/replay.fifo"))]);
    }

    #[test]
    fn test_plan_stdout_flag_or_config() {
        let output = OutputConfig::default();
        assert_eq!(
            plan_targets(&output, true, false).expect("stdout flag"),
            vec![SinkTarget::Stdout]
        );
        let output = OutputConfig {
            stdout: true,
            files: Vec::new(),
        };
        assert_eq!(
            plan_targets(&output, false, false).expect("stdout config"),
            vec![SinkTarget::Stdout]
        );
    }

    #[tokio::test]
    async fn test_run_writes_raw_lines_to_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.log");
        let shipper = Shipper::open(&[SinkTarget::File(path.clone())])
            .await
            .expect("open file sink");

        let (tx, rx) = mpsc::channel(4);
        tx.send(message(r#"{"a":1}"#)).await.expect("send");
        tx.send(message(r#"{"a":2}"#)).await.expect("send");
        drop(tx);

        let report = shipper.run(rx).await.expect("ship");
        assert_eq!(report.delivered, 2);
        let written = std::fs::read_to_string(&path).expect("read output");
        assert_eq!(written, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[tokio::test]
    async fn test_run_fails_when_every_sink_fails() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let shipper = Shipper { sinks: Vec::new() }.with_writer("closed", Box::new(client));

        let (tx, rx) = mpsc::channel(1);
        tx.send(message("x")).await.expect("send");
        drop(tx);

        let err = shipper.run(rx).await.expect_err("closed pipe");
        assert_eq!(err.exit_code(), 10);
    }
}
