//! Ironpost CLI -- replays recorded security logs with their original timing

mod cli;
mod commands;
mod error;
mod logging;
mod output;
mod shipper;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Replay(args) => {
            let config = commands::load_config(&cli.config).await?;
            logging::init_tracing(&config.general, cli.log_level.as_deref())?;
            ironpost_core::metrics::describe_all();
            tracing::info!(config = %cli.config.display(), "ironpost replay starting");
            commands::replay::execute(args, config, &writer).await
        }
        Commands::Config(args) => {
            logging::init_tracing(
                &ironpost_core::config::GeneralConfig::default(),
                cli.log_level.as_deref(),
            )?;
            commands::config::execute(args, &cli.config, &writer).await
        }
    }
}
