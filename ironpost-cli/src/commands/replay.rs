//! `ironpost replay` command handler

use std::io::Write;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ironpost_core::config::{IronpostConfig, LogReplayConfig};
use ironpost_core::error::IronpostError;
use ironpost_log_replay::{ReplayConfig, ReplayEngineBuilder};

use crate::cli::ReplayArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::shipper::{Shipper, SinkTarget, plan_targets};

/// Execute the `replay` command.
///
/// Order matters: outputs and directories are validated before any log file
/// is read, and playback starts only after every file has been built and seeked.
pub async fn execute(
    args: ReplayArgs,
    mut config: IronpostConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    apply_overrides(&mut config.replay, &args);
    config.replay.validate().map_err(IronpostError::from)?;

    let targets = plan_targets(&config.output, args.stdout, args.play_outputs_enable)?;
    let replay_config = ReplayConfig::from_core(&config.replay)?;
    replay_config.validate()?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut engine = ReplayEngineBuilder::new()
        .config(replay_config)
        .cancel_token(cancel.clone())
        .build()?;
    engine.prepare().await?;
    let files = engine.enabled_count();

    let shipper = Shipper::open(&targets).await?;
    info!(files, sinks = shipper.sink_count(), "replay starting");
    let playback = engine.play()?;

    let shipped = shipper.run(playback.messages).await;
    if shipped.is_err() {
        cancel.cancel();
    }
    let played = playback
        .supervisor
        .await
        .map_err(|e| CliError::Replay(format!("playback supervisor failed: {e}")))?;
    let shipped = shipped?;

    let summary = ReplaySummary {
        files,
        emitted: played.emitted,
        skipped: played.skipped,
        failed_files: played.failed_files,
        delivered: shipped.delivered,
        failed_sinks: shipped.failed_sinks,
        cancelled: played.cancelled,
        sinks: targets.iter().map(ToString::to_string).collect(),
    };
    if targets.contains(&SinkTarget::Stdout) {
        writer.render_stderr(&summary)?;
    } else {
        writer.render(&summary)?;
    }
    Ok(())
}

/// Apply command-line flags on top of file and env configuration.
fn apply_overrides(replay: &mut LogReplayConfig, args: &ReplayArgs) {
    if args.cache {
        replay.cache = true;
    }
    if let Some(ref from) = args.time_from {
        replay.time_from = from.clone();
    }
    if let Some(ref to) = args.time_to {
        replay.time_to = to.clone();
    }
    if let Some(workers) = args.workers {
        replay.workers = workers;
    }
    if let Some(ref dir) = args.work_dir {
        replay.work_dir = dir.clone();
    }
    if args.strict {
        replay.ignore_parse_errors = false;
    }
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to listen for interrupt");
                    return;
                }
                info!("interrupt received, stopping replay");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

/// Replay run summary.
#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    /// Files that overlapped the window
    pub files: usize,
    /// Messages handed to the shipper
    pub emitted: u64,
    /// Messages skipped for lack of a timestamp
    pub skipped: u64,
    /// Files whose reader failed mid-playback
    pub failed_files: u64,
    /// Messages written to at least one sink
    pub delivered: u64,
    /// Sinks dropped after write failures
    pub failed_sinks: usize,
    /// Whether the run was interrupted
    pub cancelled: bool,
    /// Enabled sinks
    pub sinks: Vec<String>,
}

impl Render for ReplaySummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let status = if self.cancelled {
            "CANCELLED".yellow().bold()
        } else {
            "DONE".green().bold()
        };
        writeln!(w, "Replay: {}", status)?;
        writeln!(w, "  Files:     {}", self.files)?;
        writeln!(w, "  Emitted:   {}", self.emitted)?;
        writeln!(w, "  Delivered: {}", self.delivered)?;
        if self.skipped > 0 {
            writeln!(w, "  Skipped:   {}", self.skipped.to_string().yellow())?;
        }
        if self.failed_files > 0 || self.failed_sinks > 0 {
            writeln!(
                w,
                "  Failures:  {} files, {} sinks",
                self.failed_files.to_string().red(),
                self.failed_sinks.to_string().red()
            )?;
        }
        writeln!(w, "  Sinks:     {}", self.sinks.join(", "))?;
        Ok(())
    }
}
