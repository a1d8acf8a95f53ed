//! Command handlers -- one module per subcommand

pub mod config;
pub mod replay;

use std::path::Path;

use ironpost_core::config::IronpostConfig;
use ironpost_core::error::{ConfigError, IronpostError};

use crate::error::CliError;

/// Load the configuration file with env overrides applied.
///
/// A missing file falls back to defaults plus env overrides, so a replay can be
/// driven entirely by `IRONPOST_*` variables and flags.
pub async fn load_config(path: &Path) -> Result<IronpostConfig, CliError> {
    match IronpostConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(IronpostError::Config(ConfigError::FileNotFound { .. })) => {
            let mut config = IronpostConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}
