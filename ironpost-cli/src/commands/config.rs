//! `ironpost config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use ironpost_core::config::IronpostConfig;
use ironpost_log_replay::ReplayConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::commands::load_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &[&str] = &["general", "replay", "output"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Execute the config validate subcommand.
///
/// Runs the file-level checks first and, when they pass, the replay checks
/// that touch the filesystem (stream directories, window parsing).
///
/// # Errors
///
/// Returns `CliError::Config` if any check fails.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match IronpostConfig::load(config_path).await {
        Ok(config) => replay_errors(&config),
        Err(e) => vec![e.to_string()],
    };
    let report = ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

fn replay_errors(config: &IronpostConfig) -> Vec<String> {
    let mut errors = Vec::new();
    match ReplayConfig::from_core(&config.replay) {
        Ok(replay) => {
            if let Err(e) = replay.validate() {
                errors.push(e.to_string());
            }
        }
        Err(e) => errors.push(e.to_string()),
    }
    if !config.output.has_outputs() {
        errors.push("no outputs configured".to_owned());
    }
    errors
}

/// Execute the config show subcommand.
///
/// Displays the effective configuration (file + env overrides + defaults).
///
/// # Errors
///
/// Returns `CliError::Command` if the section name is unknown.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = load_config(config_path).await?;
    let source = config_path.display().to_string();

    let report = match section {
        Some(name) => {
            let config_toml = match name.as_str() {
                "general" => to_toml(&config.general),
                "replay" => to_toml(&config.replay),
                "output" => to_toml(&config.output),
                _ => {
                    return Err(CliError::Command(format!(
                        "unknown section: {} (expected: {})",
                        name,
                        SECTIONS.join(", ")
                    )));
                }
            };
            ConfigReport {
                source,
                section: Some(name),
                config_toml,
            }
        }
        None => ConfigReport {
            source,
            section: None,
            config_toml: to_toml(&config),
        },
    };

    writer.render(&report)?;

    Ok(())
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironpost_core::config::StreamConfig;
    use ironpost_core::types::EventKind;

    #[test]
    fn test_config_report_render_text_specific_section() {
        let report = ConfigReport {
            source: "/etc/ironpost.toml".to_owned(),
            section: Some("replay".to_owned()),
            config_toml: "workers = 4".to_owned(),
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("[replay]"), "should show section name");
        assert!(output.contains("workers"), "should show config content");
    }

    #[test]
    fn test_config_report_json_serialization() {
        let report = ConfigReport {
            source: "test.toml".to_owned(),
            section: Some("output".to_owned()),
            config_toml: "stdout = true".to_owned(),
        };

        let json = serde_json::to_string(&report).expect("JSON serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse JSON");

        assert_eq!(parsed["source"].as_str(), Some("test.toml"));
        assert_eq!(parsed["section"].as_str(), Some("output"));
        assert!(
            parsed.get("config_toml").is_none(),
            "config_toml should be skipped"
        );
    }

    #[test]
    fn test_config_validation_report_invalid_multiple_errors() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec![
                "no outputs configured".to_owned(),
                "replay.workers: must be greater than 0".to_owned(),
            ],
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("INVALID"));
        assert!(output.contains("no outputs configured"));
        assert!(output.contains("replay.workers"));
    }

    #[test]
    fn test_config_validation_report_json_valid() {
        let report = ConfigValidationReport {
            source: "test.toml".to_owned(),
            valid: true,
            errors: Vec::new(),
        };

        let json = serde_json::to_string(&report).expect("JSON serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse JSON");

        assert_eq!(parsed["valid"].as_bool(), Some(true));
        assert_eq!(
            parsed["errors"].as_array().expect("should be array").len(),
            0
        );
    }

    #[test]
    fn test_replay_errors_reports_missing_streams_and_outputs() {
        let errors = replay_errors(&IronpostConfig::default());
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("no valid log directory paths configured"));
        assert_eq!(errors[1], "no outputs configured");
    }

    #[test]
    fn test_replay_errors_reports_missing_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = IronpostConfig::default();
        config.output.stdout = true;
        config.replay.streams.push(StreamConfig {
            kind: EventKind::Snoopy,
            dirs: vec![dir.path().join("gone").display().to_string()],
        });

        let errors = replay_errors(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not accessible"), "got: {}", errors[0]);
    }

    #[test]
    fn test_replay_errors_empty_for_valid_setup() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = IronpostConfig::default();
        config.output.stdout = true;
        config.replay.streams.push(StreamConfig {
            kind: EventKind::Syslog,
            dirs: vec![dir.path().display().to_string()],
        });

        assert!(replay_errors(&config).is_empty());
    }

    #[tokio::test]
    async fn test_show_rejects_unknown_section() {
        let dir = tempfile::tempdir().expect("temp dir");
        let writer = OutputWriter::new(crate::cli::OutputFormat::Json);
        let err = execute_show(
            &dir.path().join("ironpost.toml"),
            Some("metrics".to_owned()),
            &writer,
        )
        .await
        .expect_err("unknown section");
        assert!(err.to_string().contains("expected: general, replay, output"));
    }
}
