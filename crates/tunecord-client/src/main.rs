//! tunecord CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use tunecord_client::cli::{Cli, Command, ConfigAction};
use tunecord_client::commands;
use tunecord_client::config::{ClientConfig, Overrides};
use tunecord_client::error::{ClientError, ClientResult};
use tunecord_core::{TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config {
        ClientConfig::load_from(path).map_err(ClientError::Config)?
    } else {
        ClientConfig::load().map_err(ClientError::Config)?
    };

    // Initialize tracing
    let mut tracing = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if cli.json_logs {
        tracing = tracing.with_format(TracingOutputFormat::Json);
    }
    init_tracing(tracing)?;

    let overrides = Overrides {
        client_id: cli.client_id.clone(),
        ipc_dir: cli.ipc_dir.clone(),
    };

    // Handle subcommands
    match cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config, &overrides),
            ConfigAction::Path => commands::config::path(),
        },
        Some(Command::Probe { timeout }) => {
            let ipc = config
                .to_ipc_config(&overrides)
                .map_err(ClientError::Config)?;
            commands::probe::probe(&ipc, Duration::from_secs(timeout)).await
        }
        Some(Command::Run { exit_on_eof }) => {
            let ipc = config
                .to_ipc_config(&overrides)
                .map_err(ClientError::Config)?;
            commands::run::run(ipc, &config, exit_on_eof).await
        }
        None => {
            let ipc = config
                .to_ipc_config(&overrides)
                .map_err(ClientError::Config)?;
            commands::run::run(ipc, &config, false).await
        }
    }
}
