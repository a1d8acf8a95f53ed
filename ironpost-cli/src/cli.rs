//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Ironpost -- replay recorded security logs at their original cadence.
///
/// Use `ironpost <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ironpost", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ironpost.toml configuration file.
    #[arg(short, long, default_value = "ironpost.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format for command reports.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay recorded log directories in real time.
    Replay(ReplayArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- replay ----

/// Replay recorded log files with their original inter-message delays.
#[derive(Args, Debug, Default)]
pub struct ReplayArgs {
    /// Load and store timestamp diffs in the work directory cache.
    #[arg(long)]
    pub cache: bool,

    /// Window start, `YYYY-MM-DD HH:MM:SS` (default: 24 hours ago).
    #[arg(long)]
    pub time_from: Option<String>,

    /// Window end, `YYYY-MM-DD HH:MM:SS` (default: now).
    #[arg(long)]
    pub time_to: Option<String>,

    /// Number of workers for stat/build/seek passes.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Work directory for cache entries and sequence dumps.
    #[arg(long)]
    pub work_dir: Option<String>,

    /// Forward messages to the file/FIFO outputs from `[output].files`.
    #[arg(long)]
    pub play_outputs_enable: bool,

    /// Write replayed messages to stdout.
    #[arg(long)]
    pub stdout: bool,

    /// Fail the whole file on the first unparsable line instead of skipping it.
    #[arg(long)]
    pub strict: bool,
}

// ---- config ----

/// Manage ironpost configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and the configured stream directories.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, replay, output).
        #[arg(long)]
        section: Option<String>,
    },
}
