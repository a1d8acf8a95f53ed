//! Logging initialization for the ironpost CLI.
//!
//! Configures `tracing-subscriber` based on the `[general]` section
//! of `IronpostConfig`. Log lines go to stderr so that replayed
//! messages on stdout stay machine-readable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ironpost_core::config::GeneralConfig;

use crate::error::CliError;

/// Pick the filter directive: `RUST_LOG` wins, then `--log-level`, then the config.
fn build_filter(config: &GeneralConfig, level_override: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(level_override.unwrap_or(config.log_level.as_str()))
    })
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Human-readable colored output (default)
pub fn init_tracing(config: &GeneralConfig, level_override: Option<&str>) -> Result<(), CliError> {
    let env_filter = build_filter(config, level_override);

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    CliError::Command(format!("failed to initialize JSON tracing subscriber: {}", e))
                })?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    CliError::Command(format!(
                        "failed to initialize pretty tracing subscriber: {}",
                        e
                    ))
                })?;
        }
        _ => {
            return Err(CliError::Config(format!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                config.log_format
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_format_is_config_error() {
        let config = GeneralConfig {
            log_level: "info".to_owned(),
            log_format: "xml".to_owned(),
        };
        let err = init_tracing(&config, None).expect_err("xml is not a log format");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_override_takes_precedence_over_config() {
        let config = GeneralConfig {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        };
        if std::env::var_os("RUST_LOG").is_none() {
            let filter = build_filter(&config, Some("debug"));
            assert_eq!(filter.to_string(), "debug");
        }
    }
}
