//! CLI-specific error types and exit code mapping

use ironpost_core::error::IronpostError;
use ironpost_log_replay::LogReplayError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Replay setup or playback failed.
    #[error("replay error: {0}")]
    Replay(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from ironpost-core.
    #[error("{0}")]
    Core(#[from] IronpostError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// Every setup failure (configuration, missing directories, window
    /// parsing, cache and seek errors) is fatal with code 1. Only write
    /// failures on the output side get their own code.
    ///
    /// | Code | Meaning                        |
    /// |------|--------------------------------|
    /// | 0    | Success                        |
    /// | 1    | Setup or replay failure        |
    /// | 10   | Output IO error                |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 10,
            Self::Config(_)
            | Self::JsonSerialize(_)
            | Self::Command(_)
            | Self::Replay(_)
            | Self::Core(_) => 1,
        }
    }
}

impl From<LogReplayError> for CliError {
    fn from(e: LogReplayError) -> Self {
        match e {
            LogReplayError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Replay(other.to_string()),
        }
    }
}
